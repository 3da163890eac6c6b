mod checkpoint;
pub mod learner;
pub mod loss;
pub mod metrics;
mod train;

pub use checkpoint::EveryNEpochs;
pub use learner::SegmentationOutput;
pub use metrics::IoUMetric;
pub use train::{
    CONFIG_FILE, MonitorSample, TrainingConfig, model_path, prepare_run_root, train,
};
