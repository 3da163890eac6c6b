use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::{DataLoaderBuilder, Dataset},
    module::AutodiffModule,
    optim::AdamConfig,
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{LearnerBuilder, metric::LossMetric},
};

use super::{EveryNEpochs, IoUMetric};
use crate::dataset::{SegmentationBatcher, WaterDataset, WaterDatasetConfig};
use crate::error;
use crate::inference::Predictor;
use crate::model::{DeepLabV3, DeepLabV3Config};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: DeepLabV3Config,
    pub dataset: WaterDatasetConfig,
    #[config(default = 100)]
    pub epochs: usize,
    #[config(default = 10)]
    pub batch_size: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Checkpoint period in epochs, `0` disables intermediate checkpoints.
    #[config(default = 50)]
    pub save_every_epoch: usize,
    #[config(default = 8)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    /// Share of the dataset held out for validation. With `0` the training
    /// set is also used for validation.
    #[config(default = 0.0)]
    pub valid_ratio: f64,
}

/// Image used to visualize the trained model, with its optional ground truth.
///
/// The snapshot is written once, after the last epoch, as
/// `monitor_background.png`, `monitor_water.png` and
/// `monitor_ground_truth.png` in the run root. Per-epoch progress is tracked
/// by the learner's loss and IoU logs.
#[derive(Debug, Clone)]
pub struct MonitorSample {
    pub image: PathBuf,
    pub mask: Option<PathBuf>,
}

/// `<root>/runs/<run_name>`, created when missing.
pub fn prepare_run_root(root: &Path, run_name: &str) -> error::Result<PathBuf> {
    let run_root = root.join("runs").join(run_name);

    if run_root.exists() {
        tracing::info!("Run root {} already exists", run_root.display());
    } else {
        std::fs::create_dir_all(&run_root)?;
        tracing::info!("Created run root {}", run_root.display());
    }

    Ok(run_root)
}

/// Path of the final model record for `config`.
pub fn model_path(run_root: &Path, config: &TrainingConfig) -> PathBuf {
    run_root.join(config.model.backbone.name())
}

/// Fine-tune a DeepLabV3 model on the pairs found under `data_root`.
///
/// Metrics and checkpoints are written to `run_root`, the final model to
/// [model_path].
pub fn train<B: AutodiffBackend>(
    run_root: &Path,
    data_root: &Path,
    config: &TrainingConfig,
    device: B::Device,
    pretrained: Option<&Path>,
    monitor: Option<&MonitorSample>,
) -> error::Result<DeepLabV3<B>> {
    config.save(run_root.join(CONFIG_FILE))?;

    B::seed(config.seed);

    let dataset = WaterDataset::new(data_root, &config.dataset)?;
    tracing::info!("{} training images loaded.", dataset.len());
    let (dataset_train, dataset_valid) = dataset.split(config.valid_ratio, config.seed);

    let batcher_train = SegmentationBatcher::<B>::new(device.clone());
    let batcher_valid = SegmentationBatcher::<B::InnerBackend>::new(device.clone());

    tracing::info!("Building dataloaders with batch size {}...", config.batch_size);
    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .shuffle(config.seed)
        .build(dataset_train);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(dataset_valid);

    tracing::info!("Model: {}", config.model.backbone.name());
    let model = config.model.init::<B>(&device);
    let model = match pretrained {
        Some(path) => load_pretrained(model, path, &device)?,
        None => {
            tracing::warn!("No pretrained weights given, training from scratch");
            model
        }
    };

    let learner = LearnerBuilder::new(run_root)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(IoUMetric::new())
        .metric_valid_numeric(IoUMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .with_checkpointing_strategy(EveryNEpochs::new(config.save_every_epoch))
        .with_application_logger(None)
        .devices(vec![device.clone()])
        .num_epochs(config.epochs)
        .summary()
        .build(model, AdamConfig::new().init(), config.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    let path = model_path(run_root, config);
    model_trained
        .clone()
        .save_file(&path, &CompactRecorder::new())?;
    tracing::info!("Saved model to {}", path.display());

    if let Some(sample) = monitor {
        let predictor = Predictor::new(
            model_trained.valid(),
            config.dataset.image_size,
            device.clone(),
        );
        predictor.write_snapshot(&sample.image, sample.mask.as_deref(), run_root)?;
    }

    Ok(model_trained)
}

#[cfg(feature = "pretrained")]
fn load_pretrained<B: Backend>(
    model: DeepLabV3<B>,
    path: &Path,
    device: &B::Device,
) -> error::Result<DeepLabV3<B>> {
    crate::model::load_pretrained_backbone(model, path, device)
}

#[cfg(not(feature = "pretrained"))]
fn load_pretrained<B: Backend>(
    model: DeepLabV3<B>,
    path: &Path,
    _device: &B::Device,
) -> error::Result<DeepLabV3<B>> {
    tracing::warn!(
        "Built without the `pretrained` feature, ignoring {}",
        path.display()
    );
    Ok(model)
}
