//! Mask rendering: thresholding of model scores and blending with the source image.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Opacity of the mask in the blended visualization.
pub const BLEND_ALPHA: f32 = 0.5;

fn min_max(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        })
}

fn grayscale(values: &[f32], width: u32, height: u32, f: impl Fn(f32) -> u8) -> GrayImage {
    assert_eq!(
        values.len(),
        (width * height) as usize,
        "Expected {}x{} values, got {}",
        width,
        height,
        values.len()
    );

    GrayImage::from_fn(width, height, |x, y| {
        Luma([f(values[(y * width + x) as usize])])
    })
}

/// Min-max normalize row-major `values` and keep those above one half.
///
/// Kept pixels are `255`, the others `0`. A constant input yields an empty mask.
pub fn binarize(values: &[f32], width: u32, height: u32) -> GrayImage {
    let (min, max) = min_max(values);
    let range = max - min;

    grayscale(values, width, height, |v| {
        if range > 0.0 && (v - min) / range > 0.5 {
            255
        } else {
            0
        }
    })
}

/// Min-max scale row-major `values` to the full grayscale range.
pub fn probability_map(values: &[f32], width: u32, height: u32) -> GrayImage {
    let (min, max) = min_max(values);
    let range = max - min;

    grayscale(values, width, height, |v| {
        if range > 0.0 {
            ((v - min) / range * 255.0).round() as u8
        } else {
            0
        }
    })
}

/// `image * (1 - alpha) + mask * alpha` on every RGBA channel.
pub fn blend(image: &RgbaImage, mask: &RgbaImage, alpha: f32) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(Error::SizeMismatch {
            left: image.dimensions(),
            right: mask.dimensions(),
        });
    }

    Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let a = image.get_pixel(x, y);
        let b = mask.get_pixel(x, y);
        Rgba(std::array::from_fn(|c| {
            (a[c] as f32 * (1.0 - alpha) + b[c] as f32 * alpha).round() as u8
        }))
    }))
}

/// Where the blend of a mask is written: `output` becomes `outputblend` and
/// `jpg` becomes `png` in the file name.
///
/// Names holding neither get `blend.png` appended to their stem, so the blend
/// never replaces the mask.
pub fn blend_path(mask_path: &Path) -> PathBuf {
    let original = mask_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = original
        .replace("output", "outputblend")
        .replace("jpg", "png");

    if name != original {
        return mask_path.with_file_name(name);
    }

    let stem = mask_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    mask_path.with_file_name(format!("{stem}blend.png"))
}

/// Blend the image with its mask and write the result to [blend_path].
pub fn write_blend(image_path: &Path, mask_path: &Path) -> Result<PathBuf> {
    let image = image::open(image_path)?.to_rgba8();
    let mask = image::open(mask_path)?.to_rgba8();
    tracing::debug!(
        "Image shape: {:?}, mask shape: {:?}",
        image.dimensions(),
        mask.dimensions()
    );

    let blended = blend(&image, &mask, BLEND_ALPHA)?;
    let path = blend_path(mask_path);
    blended.save(&path)?;

    Ok(path)
}
