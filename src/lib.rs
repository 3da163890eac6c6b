pub mod error;
pub mod evaluation;
pub mod model;
pub mod postprocess;

#[cfg(feature = "dataset")]
pub mod dataset;

#[cfg(feature = "dataset")]
pub mod inference;

#[cfg(feature = "training")]
pub mod training;

pub use error::{Error, Result};
pub use evaluation::{IouReport, PairScore, evaluate};
pub use model::{BackboneKind, DeepLabV3, DeepLabV3Config};

#[cfg(feature = "dataset")]
pub use dataset::{WaterDataset, WaterDatasetConfig};

#[cfg(feature = "dataset")]
pub use inference::Predictor;

#[cfg(feature = "training")]
pub use training::{IoUMetric, MonitorSample, SegmentationOutput, TrainingConfig, train};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
