use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::{Autodiff, ndarray::NdArrayDevice, wgpu::WgpuDevice};
use burn::tensor::backend::AutodiffBackend;
use clap::Args;
use water_deeplab::{
    BackboneKind, DeepLabV3Config, MonitorSample, TrainingConfig, WaterDatasetConfig,
    training::prepare_run_root,
};

use super::{CpuBackend, GpuBackend};

#[derive(Args)]
pub struct TrainArgs {
    #[arg(long, default_value = "deeplabv3-test")]
    pub run_name: String,

    #[arg(short, long)]
    pub data_root: PathBuf,

    #[arg(long, default_value = "image")]
    pub image_folder: String,

    #[arg(long, default_value = "mask")]
    pub mask_folder: String,

    /// Directory holding the `runs` folder
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    #[arg(long)]
    pub cpu: bool,

    /// resnet50, resnet101 or mobilenetv3
    #[arg(short, long, default_value = "resnet50")]
    pub model: BackboneKind,

    #[arg(long, default_value_t = 50)]
    pub save_every_epoch: usize,

    #[arg(short, long, default_value_t = 100)]
    pub epochs: usize,

    #[arg(short, long, default_value_t = 10)]
    pub batch_size: usize,

    #[arg(short, long, default_value_t = 0.001)]
    pub lr: f64,

    /// torchvision DeepLabV3 checkpoint (.pth) to initialize the backbone from
    #[arg(long)]
    pub pretrained: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0)]
    pub valid_ratio: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 8)]
    pub num_workers: usize,

    /// Image whose probability maps are written to the run root after training
    #[arg(long)]
    pub monitor_image: Option<PathBuf>,

    #[arg(long, requires = "monitor_image")]
    pub monitor_mask: Option<PathBuf>,
}

impl TrainArgs {
    fn config(&self) -> TrainingConfig {
        let dataset =
            WaterDatasetConfig::new(self.image_folder.clone(), self.mask_folder.clone());

        TrainingConfig::new(DeepLabV3Config::new(self.model.clone()), dataset)
            .with_epochs(self.epochs)
            .with_batch_size(self.batch_size)
            .with_learning_rate(self.lr)
            .with_save_every_epoch(self.save_every_epoch)
            .with_num_workers(self.num_workers)
            .with_seed(self.seed)
            .with_valid_ratio(self.valid_ratio)
    }

    fn monitor(&self) -> Option<MonitorSample> {
        self.monitor_image.as_ref().map(|image| MonitorSample {
            image: image.clone(),
            mask: self.monitor_mask.clone(),
        })
    }
}

fn train_on<B: AutodiffBackend>(args: &TrainArgs, device: B::Device) -> Result<()> {
    tracing::info!("Run name: {}", args.run_name);
    let run_root = prepare_run_root(&args.root, &args.run_name)
        .with_context(|| format!("Cannot create run root under {}", args.root.display()))?;

    let config = args.config();
    water_deeplab::train::<B>(
        &run_root,
        &args.data_root,
        &config,
        device,
        args.pretrained.as_deref(),
        args.monitor().as_ref(),
    )
    .context("Training failed")?;

    tracing::info!("Training finished, artifacts in {}", run_root.display());
    Ok(())
}

pub fn run(args: &TrainArgs) -> Result<()> {
    if args.cpu {
        tracing::info!("Using CPU");
        train_on::<Autodiff<CpuBackend>>(args, NdArrayDevice::default())
    } else {
        tracing::info!("Using GPU");
        train_on::<Autodiff<GpuBackend>>(args, WgpuDevice::default())
    }
}
