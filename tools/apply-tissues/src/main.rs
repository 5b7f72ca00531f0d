//! 估计颅内体积和大脑体积, 并写出各组织通道的概率图.

use anyhow::Context;
use clap::Parser;
use mri_berry::tissues::{apply_tissues, ModelService, ProbabilityMapLoader};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apply-tissues")]
#[command(version, about = "Estimate intra-cranial and cerebrum volumes of a brain MRI", long_about = None)]
struct Cli {
    /// Input volume (.nii or .nii.gz)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// 4D probability maps in the model frame, one channel per tissue
    #[arg(value_name = "PROBABILITIES")]
    probabilities: PathBuf,
}

fn main() -> anyhow::Result<()> {
    utils::init_logger();
    let cli = Cli::parse();

    let mut service = ModelService::new(ProbabilityMapLoader::new(&cli.probabilities));
    let estimate = apply_tissues(&cli.input, &mut service)
        .with_context(|| format!("failed to estimate tissues of {}", cli.input.display()))?;
    service.teardown();

    utils::print_volumes(&estimate.volumes)?;
    Ok(())
}
