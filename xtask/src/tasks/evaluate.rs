use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args)]
pub struct EvaluateArgs {
    /// Folder of predicted `output<i>.jpg` masks
    #[arg(long)]
    pub pred_dir: PathBuf,

    /// Folder of ground truth `input<i>.jpg` masks
    #[arg(long)]
    pub gt_dir: PathBuf,

    #[arg(short, long, default_value_t = 12)]
    pub count: usize,
}

pub fn run(args: &EvaluateArgs) -> Result<()> {
    let report = water_deeplab::evaluate(&args.pred_dir, &args.gt_dir, args.count)
        .context("Evaluation failed")?;

    println!("{report}");
    Ok(())
}
