//! 命令行工具依赖的通用组件.

use log::LevelFilter;
use mri_berry::tissues::{truncate_volume, VolumeEstimate};
use mri_berry::MriResult;
use simple_logger::SimpleLogger;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 初始化日志. 默认级别为 `Info`, 可由环境变量 `RUST_LOG` 覆盖.
///
/// # 注意
///
/// 重复初始化不会 panic, 只会被忽略.
pub fn init_logger() {
    let _ = SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init();
}

/// 在标准输出打印体积估计结果, 取整方式与写出的文本文件一致.
pub fn print_volumes(volumes: &VolumeEstimate) -> MriResult<()> {
    sep();
    println!(
        "intra-cranial volume (mm^3): {}",
        truncate_volume(volumes.intracranial)?
    );
    println!("cerebrum volume (mm^3):      {}", truncate_volume(volumes.cerebrum)?);
    sep();
    Ok(())
}
