use std::path::PathBuf;

use burn::record::RecorderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: `{0}`")]
    Io(#[from] std::io::Error),

    #[error("Image error: `{0}`")]
    Image(#[from] image::ImageError),

    #[error("Record error: `{0}`")]
    Record(#[from] RecorderError),

    #[error("Directory does not exist: {0:?}")]
    MissingDirectory(PathBuf),

    #[error("Unexpected file name: {0:?}")]
    InvalidFileName(PathBuf),

    #[error("Found {images} images but {masks} masks")]
    UnpairedDataset { images: usize, masks: usize },

    #[error("No image/mask pairs found under {0:?}")]
    EmptyDataset(PathBuf),

    #[error("Invalid model name `{0}`, must be one of resnet50, resnet101, mobilenetv3")]
    UnknownModel(String),

    #[error("Mask size mismatch: {left:?} vs {right:?}")]
    SizeMismatch {
        left: (u32, u32),
        right: (u32, u32),
    },
}
