mod segmentation;
pub mod transform;
mod water;

pub use segmentation::{SegmentationBatch, SegmentationBatcher};
pub use water::{WaterDataset, WaterDatasetConfig, WaterItem, WaterSplit, file_index};
