pub mod evaluate;
pub mod predict;
pub mod train;

use burn::backend::{NdArray, Wgpu};

pub type GpuBackend = Wgpu<f32, i32>;
pub type CpuBackend = NdArray<f32>;
