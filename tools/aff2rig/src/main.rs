//! 将文本格式的仿射矩阵转换为 ITK 刚体变换文件 `<input>.rigid.tfm`.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aff2rig")]
#[command(version, about = "Convert an affine matrix into an ITK rigid transform", long_about = None)]
struct Cli {
    /// Whitespace separated matrix with at least 3 rows and 4 columns
    #[arg(value_name = "MATRIX")]
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    utils::init_logger();
    let cli = Cli::parse();

    let output = mri_berry::transform::convert_file(&cli.input)
        .with_context(|| format!("failed to convert {}", cli.input.display()))?;
    println!("{}", output.display());
    Ok(())
}
