//! 阈值化 MRI 体数据, 可选保留最大连通域, 并可用得到的掩膜对另一体数据去颅骨.

use anyhow::Context;
use clap::{CommandFactory, Parser};
use mri_berry::post_proc::ThresholdJob;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "threshold-image")]
#[command(version, about = "Threshold a volume, keep its largest component, optionally skull-strip another volume", long_about = None)]
struct Cli {
    /// Input volume (.nii or .nii.gz)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Voxels strictly above this value become foreground
    #[arg(value_name = "THRESHOLD", allow_negative_numbers = true)]
    threshold: f64,

    /// Output mask
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Post-processing mode, may contain "largest_cc" and/or "strip"
    #[arg(value_name = "MODE")]
    mode: Option<String>,

    /// Volume to skull-strip (required by "strip")
    #[arg(value_name = "MRI_INPUT")]
    mri_input: Option<PathBuf>,

    /// Output path of the stripped volume (required by "strip")
    #[arg(value_name = "STRIPPED_OUTPUT")]
    stripped_output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    utils::init_logger();
    let cli = Cli::parse();

    let job = match ThresholdJob::new(
        cli.input,
        cli.threshold,
        cli.output,
        cli.mode.as_deref(),
        cli.mri_input,
        cli.stripped_output,
    ) {
        Ok(job) => job,
        Err(e) => {
            Cli::command()
                .error(clap::error::ErrorKind::MissingRequiredArgument, e)
                .exit()
        }
    };
    log::debug!("{job:?}");

    job.run()
        .with_context(|| format!("failed to process {}", job.input.display()))?;
    Ok(())
}
