//! 小矩阵线性代数辅助函数.

use crate::{MriError, MriResult};
use ndarray::{Array2, Axis};
use ndarray_linalg::SVD;

/// 计算 `m` 的正交极分解因子 `U·Vᵀ`, 即距离 `m` 最近的正交矩阵.
#[inline]
pub(crate) fn polar_factor(m: &Array2<f64>) -> MriResult<Array2<f64>> {
    polar_factor_with_tol(m, |_| 0.0)
}

/// 与 [`polar_factor`] 类似, 但丢弃不大于 `max(S) * max(rows, cols) * ε` 的奇异值
/// 所对应的奇异向量. 秩亏时结果的对应方向为零.
#[inline]
pub(crate) fn polar_factor_truncated(m: &Array2<f64>) -> MriResult<Array2<f64>> {
    let scale = m.nrows().max(m.ncols()) as f64 * f64::EPSILON;
    polar_factor_with_tol(m, |s_max| s_max * scale)
}

fn polar_factor_with_tol(m: &Array2<f64>, tol: impl Fn(f64) -> f64) -> MriResult<Array2<f64>> {
    let (u, s, vt) = m.svd(true, true)?;
    let (Some(u), Some(vt)) = (u, vt) else {
        return Err(MriError::MatrixFormat("SVD returned no singular vectors".to_owned()));
    };
    let s_max = s.iter().copied().fold(0.0, f64::max);
    let tol = tol(s_max);
    let keep: Vec<usize> = s
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| (v > tol).then_some(i))
        .collect();
    Ok(u.select(Axis(1), &keep).dot(&vt.select(Axis(0), &keep)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    fn close(a: &Array2<f64>, b: &Array2<f64>) -> bool {
        a.shape() == b.shape() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    /// 带缩放的旋转矩阵, 其极分解因子就是旋转本身.
    #[test]
    fn test_polar_of_scaled_rotation() {
        let (c, s) = (30f64.to_radians().cos(), 30f64.to_radians().sin());
        let rot = arr2(&[[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]);
        let scaled = rot.dot(&Array2::from_diag(&ndarray::arr1(&[2.0, 2.0, 2.0])));
        assert!(close(&polar_factor(&scaled).unwrap(), &rot));
        assert!(close(&polar_factor(&rot).unwrap(), &rot));
    }

    #[test]
    fn test_polar_is_orthogonal() {
        let m = arr2(&[[1.0, 0.2, 0.0], [0.1, 2.0, 0.3], [0.0, -0.4, 3.0]]);
        let r = polar_factor(&m).unwrap();
        assert!(close(&r.t().dot(&r), &Array2::eye(3)));
    }

    #[test]
    fn test_truncated_rank_deficient() {
        let m = arr2(&[[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 0.0]]);
        let r = polar_factor_truncated(&m).unwrap();
        let expected = arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        assert!(close(&r, &expected));
    }
}
