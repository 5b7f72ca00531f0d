use std::fs;
use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Zip};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::{Idx3d, MriError, MriResult};

mod affine;
mod mask;

pub use affine::Affine;
pub use mask::BinaryMask;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (x, y, z) 转换成 (z, y, x). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    let [_, x, y, z, ..] = h.dim;
    (z as usize, y as usize, x as usize)
}

/// 检查 header 描述的是否是 `ndim` 维数据 (多出的维度长度必须为 1).
fn check_ndim(h: &NiftiHeader, ndim: usize) -> MriResult<()> {
    let rank = h.dim[0] as usize;
    if rank < ndim || rank > 7 || h.dim[ndim + 1..=rank].iter().any(|&d| d != 1) {
        return Err(MriError::NotVolume(h.dim));
    }
    Ok(())
}

/// 为写出准备 header: 数据已经是缩放后的物理值, 所以重置缩放参数.
fn output_header(reference: &NiftiHeader) -> NiftiHeader {
    let mut h = reference.clone();
    h.scl_slope = 1.0;
    h.scl_inter = 0.0;
    h
}

/// nifti 每个维度的长度以 `u16` 存储. 超出范围时返回 `Err`.
fn check_dims(shape: &[usize]) -> MriResult<()> {
    match shape.iter().find(|&&d| u16::try_from(d).is_err()) {
        Some(&d) => Err(MriError::DimensionOverflow(d)),
        None => Ok(()),
    }
}

/// 将单文件 nifti 写入 `path`. 路径以 `.gz` 结尾时压缩.
/// `shape` 为待写数据的形状, `write` 负责向给定路径写出.
///
/// # 注意
///
/// `WriterOptions` 会把路径的最后一个扩展名替换成 `nii`/`nii.gz`,
/// 例如 `mask_0.5mm.nii` 会被写成 `mask_0.nii`. 因此先写到同目录的临时子目录中,
/// 再重命名为 `path`, 保证写出位置与调用者给定的完全一致.
fn write_staged<F>(path: &Path, shape: &[usize], write: F) -> MriResult<()>
where
    F: FnOnce(&Path) -> nifti::Result<()>,
{
    check_dims(shape)?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let staging = tempfile::Builder::new()
        .prefix("mri-berry-")
        .tempdir_in(parent)?;
    let gz = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(".gz"));
    let tmp = staging.path().join(if gz { "out.nii.gz" } else { "out.nii" });

    write(&tmp)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// 将 `(z, y, x)` 的浮点数据以 `reference` 为模板写入 `path`.
fn write_f32(path: &Path, reference: &NiftiHeader, data: ArrayView3<f32>) -> MriResult<()> {
    let header = output_header(reference);
    // [z, y, x] -> [x, y, z].
    let data = data.reversed_axes();
    write_staged(path, data.shape(), |tmp| {
        WriterOptions::new(tmp).reference_header(&header).write_nifti(&data)
    })
}

/// 同 [`write_f32`], 但以 `u8` 存储.
fn write_u8(path: &Path, reference: &NiftiHeader, data: ArrayView3<u8>) -> MriResult<()> {
    let header = output_header(reference);
    let data = data.reversed_axes();
    write_staged(path, data.shape(), |tmp| {
        WriterOptions::new(tmp).reference_header(&header).write_nifti(&data)
    })
}

/// 读取 3D nifti 文件, 返回 header 和 `(z, y, x)` 排列的缩放后数据.
fn read_f32(path: &Path) -> MriResult<(BoxedHeader, Array3<f32>)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    check_ndim(&header, 3)?;

    // [x, y, z, 1, ...] -> [..., 1, z, y, x].
    // hint: 逻辑迭代顺序即 (z, y, x) 行优先, 与底层内存布局无关.
    let data = obj.into_volume().into_ndarray::<f32>()?.reversed_axes();
    let data = Array3::from_shape_vec(get_shape_from_header(&header), data.iter().copied().collect())?;
    Ok((header, data))
}

/// 读取 4D nifti 文件, 返回 header 和 `(t, z, y, x)` 排列的缩放后数据.
pub(crate) fn read_channels(path: &Path) -> MriResult<(BoxedHeader, Array4<f32>)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    check_ndim(&header, 4)?;

    let (z, y, x) = get_shape_from_header(&header);
    let t = header.dim[4] as usize;
    let data = obj.into_volume().into_ndarray::<f32>()?.reversed_axes();
    let data = Array4::from_shape_vec((t, z, y, x), data.iter().copied().collect())?;
    Ok((header, data))
}

/// 将 `(t, z, y, x)` 数据以 `reference` 为模板写为 4D nifti 文件.
pub(crate) fn write_channels(
    path: &Path,
    reference: &NiftiHeader,
    data: ArrayView4<f32>,
) -> MriResult<()> {
    let header = output_header(reference);
    let data = data.reversed_axes();
    write_staged(path, data.shape(), |tmp| {
        WriterOptions::new(tmp).reference_header(&header).write_nifti(&data)
    })
}

/// 3D MRI nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小 `(z, y, x)`.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取体素间距 (毫米), 按 nifti 轴 `(x, y, z)` 排列, 与内存轴顺序相反.
    #[inline]
    fn zooms(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [x as f64, y as f64, z as f64]
    }

    /// 获取仿射矩阵.
    #[inline]
    fn affine(&self) -> Affine {
        Affine::from_header(self.header())
    }

    /// 获取体素的实际体积值 (仿射矩阵行列式的绝对值), 以立方毫米为单位.
    #[inline]
    fn voxel_volume(&self) -> f64 {
        self.affine().voxel_volume()
    }
}

/// 由模板 header 和 `(z, y, x)` 形状生成新的 3D header.
///
/// # 返回值
///
/// 若任一维度超出 `u16` 范围, 则返回 `Err`.
fn header_for_shape(reference: &NiftiHeader, (z, y, x): Idx3d) -> MriResult<BoxedHeader> {
    let dim = |d: usize| u16::try_from(d).map_err(|_| MriError::DimensionOverflow(d));
    let mut header = Box::new(reference.clone());
    header.dim = [3, dim(x)?, dim(y)?, dim(z)?, 1, 1, 1, 1];
    Ok(header)
}

/// nii 格式 3D MRI 扫描, 包括 header 和强度数据. 强度值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct Volume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for Volume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 打开 nii 格式的 3D MRI 扫描 (`.nii` 或 `.nii.gz`). `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> MriResult<Self> {
        let (header, data) = read_f32(path.as_ref())?;
        Ok(Self { header, data })
    }

    /// 以 `header` 为模板, 用 `(z, y, x)` 排列的 `data` 直接创建扫描.
    /// header 中的维度信息会按 `data` 的形状更新.
    ///
    /// # 返回值
    ///
    /// 若 `data` 的某一维度无法用 nifti header 表示, 则返回 `Err`.
    pub fn from_header(header: &NiftiHeader, data: Array3<f32>) -> MriResult<Self> {
        let header = header_for_shape(header, data.dim())?;
        Ok(Self { header, data })
    }

    /// 以 `affine` 为 sform 创建扫描. 主要用于实验和测试.
    pub fn from_affine(affine: &Affine, data: Array3<f32>) -> MriResult<Self> {
        let mut header = NiftiHeader::default();
        affine.write_to(&mut header);
        Self::from_header(&header, data)
    }

    /// 创建与 `self` 共享 header 的新扫描.
    ///
    /// 如果 `data` 形状与 `self` 不一致, 则返回 `Err`.
    pub fn with_data(&self, data: Array3<f32>) -> MriResult<Self> {
        if data.dim() != self.shape() {
            return Err(MriError::ShapeMismatch {
                expected: self.shape(),
                found: data.dim(),
            });
        }
        Ok(Self {
            header: self.header.clone(),
            data,
        })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 严格大于 `threshold` 的体素为前景.
    #[inline]
    pub fn threshold(&self, threshold: f64) -> BinaryMask {
        BinaryMask::from_threshold(self.data(), threshold)
    }

    /// 将掩膜外的体素置零, 返回新的扫描. header 保持不变.
    ///
    /// 如果 `mask` 形状与 `self` 不一致, 则返回 `Err`.
    pub fn masked(&self, mask: &BinaryMask) -> MriResult<Self> {
        if mask.shape() != self.shape() {
            return Err(MriError::ShapeMismatch {
                expected: self.shape(),
                found: mask.shape(),
            });
        }
        let mut data = self.data.clone();
        Zip::from(&mut data)
            .and(mask.data())
            .for_each(|v, &m| *v *= f32::from(m));
        self.with_data(data)
    }

    /// 以 `f32` 格式写入 `path`, 保留 header (及仿射矩阵).
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MriResult<()> {
        write_f32(path.as_ref(), &self.header, self.data())
    }
}

/// nii 格式 3D 二值掩膜, 包括 header 和掩膜数据. 掩膜值以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct MaskVolume {
    header: BoxedHeader,
    mask: BinaryMask,
}

impl NiftiHeaderAttr for MaskVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl MaskVolume {
    /// 以 `reference` 的 header (仿射矩阵) 为模板包装 `mask`.
    ///
    /// 如果 `mask` 形状与 `reference` 不一致, 则返回 `Err`.
    pub fn from_reference<R: NiftiHeaderAttr>(reference: &R, mask: BinaryMask) -> MriResult<Self> {
        if mask.shape() != reference.shape() {
            return Err(MriError::ShapeMismatch {
                expected: reference.shape(),
                found: mask.shape(),
            });
        }
        let mut header = header_for_shape(reference.header(), mask.shape())?;
        // 掩膜不继承强度相关的元信息.
        header.cal_min = 0.0;
        header.cal_max = 0.0;
        header.intent_name = [0; 16];
        Ok(Self { header, mask })
    }

    /// 打开 nii 格式的 3D 掩膜. 任意非零体素都被视为前景.
    pub fn open<P: AsRef<Path>>(path: P) -> MriResult<Self> {
        let (header, data) = read_f32(path.as_ref())?;
        let mask = BinaryMask::from_predicate(data.view(), |v| v != 0.0);
        Ok(Self { header, mask })
    }

    /// 获得掩膜.
    #[inline]
    pub fn mask(&self) -> &BinaryMask {
        &self.mask
    }

    /// 以 `u8` 格式写入 `path`.
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MriResult<()> {
        write_u8(path.as_ref(), &self.header, self.mask.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn listing(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    /// 文件名中含有多个 `.` 时, 输出仍写到给定路径, 且不留下临时文件.
    #[test]
    fn test_save_dotted_names() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 12 + y * 4 + x) as f32);
        let v = Volume::from_affine(&Affine::from_zooms([0.5, 0.5, 1.0]), data.clone()).unwrap();

        let scan = dir.path().join("t1_0.5mm.nii");
        let mask = dir.path().join("brain.v2.nii.gz");
        v.save(&scan).unwrap();
        MaskVolume::from_reference(&v, v.threshold(10.0))
            .unwrap()
            .save(&mask)
            .unwrap();

        let expected: BTreeSet<String> = ["brain.v2.nii.gz", "t1_0.5mm.nii"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(listing(dir.path()), expected);
        assert_eq!(Volume::open(&scan).unwrap().data(), data);
        assert_eq!(MaskVolume::open(&mask).unwrap().mask().count(), 13);
    }

    /// 写入已存在的文件时覆盖之.
    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.nii");
        let affine = Affine::identity();
        Volume::from_affine(&affine, Array3::zeros((2, 2, 2)))
            .unwrap()
            .save(&path)
            .unwrap();
        Volume::from_affine(&affine, Array3::from_elem((2, 2, 2), 3.0))
            .unwrap()
            .save(&path)
            .unwrap();
        assert!(Volume::open(&path).unwrap().data().iter().all(|&v| v == 3.0));
        assert_eq!(listing(dir.path()).len(), 1);
    }

    #[test]
    fn test_dimension_overflow() {
        let data = Array3::zeros((1, 1, 70_000));
        assert!(matches!(
            Volume::from_affine(&Affine::identity(), data),
            Err(MriError::DimensionOverflow(70_000))
        ));
        assert!(check_dims(&[u16::MAX as usize, 1, 1]).is_ok());
        assert!(matches!(
            check_dims(&[3, 65_536]),
            Err(MriError::DimensionOverflow(65_536))
        ));
    }
}
