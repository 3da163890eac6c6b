use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice};
use burn::prelude::*;
use clap::Args;
use water_deeplab::{
    Predictor, TrainingConfig,
    inference::default_mask_path,
    training::{CONFIG_FILE, model_path},
};

use super::{CpuBackend, GpuBackend};

#[derive(Args)]
pub struct PredictArgs {
    /// Run directory holding `config.json` and the trained model
    #[arg(long)]
    pub run_root: PathBuf,

    /// Model record to load, defaults to the final model of the run
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// A single image or a folder of `*.jpg` images
    #[arg(short, long)]
    pub input: PathBuf,

    /// Mask file for a single image, mask folder otherwise (a `mask` folder
    /// next to the input folder by default)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub cpu: bool,
}

fn predict_on<B: Backend>(args: &PredictArgs, device: B::Device) -> Result<()> {
    let config_path = args.run_root.join(CONFIG_FILE);
    let config = TrainingConfig::load(&config_path)
        .map_err(|err| anyhow!("Cannot load {}: {:?}", config_path.display(), err))?;
    let checkpoint = args
        .checkpoint
        .clone()
        .unwrap_or_else(|| model_path(&args.run_root, &config));

    let predictor =
        Predictor::<B>::load(&config.model, config.dataset.image_size, &checkpoint, device)
            .with_context(|| format!("Cannot load model {}", checkpoint.display()))?;

    if args.input.is_dir() {
        let mask_folder = args
            .output
            .clone()
            .unwrap_or_else(|| default_mask_folder(&args.input));
        let count = predictor.predict_folder(&args.input, &mask_folder)?;
        tracing::info!("Wrote {count} masks to {}", mask_folder.display());
    } else {
        let mask_path = match &args.output {
            Some(path) => path.clone(),
            None => default_mask_path(&args.input)?,
        };
        predictor.predict_file(&args.input, &mask_path)?;
        tracing::info!("Wrote {}", mask_path.display());
    }

    Ok(())
}

/// `mask` next to `image_folder`, so masks never land among the inputs.
fn default_mask_folder(image_folder: &Path) -> PathBuf {
    image_folder
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("mask")
}

pub fn run(args: &PredictArgs) -> Result<()> {
    if args.cpu {
        predict_on::<CpuBackend>(args, NdArrayDevice::default())
    } else {
        predict_on::<GpuBackend>(args, WgpuDevice::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_default_to_sibling_folder() {
        assert_eq!(
            default_mask_folder(Path::new("demo_data/image")),
            PathBuf::from("demo_data/mask")
        );
        assert_eq!(default_mask_folder(Path::new("image")), PathBuf::from("mask"));
    }
}
