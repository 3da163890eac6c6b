//! Scoring of predicted masks against ground truth masks.

use std::fmt;
use std::path::Path;

use image::{GrayImage, Luma};

use crate::error::{Error, Result};

/// Grayscale level above which a mask pixel counts as water.
pub const BINARY_THRESHOLD: u8 = 128;

/// Pixels strictly above `level` become `255`, the others `0`.
pub fn threshold(image: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Intersection over union of the non-zero pixels of two masks.
///
/// Two empty masks agree perfectly and score `1.0`.
pub fn iou(predicted: &GrayImage, ground_truth: &GrayImage) -> Result<f64> {
    if predicted.dimensions() != ground_truth.dimensions() {
        return Err(Error::SizeMismatch {
            left: predicted.dimensions(),
            right: ground_truth.dimensions(),
        });
    }

    let (intersection, union) = predicted.pixels().zip(ground_truth.pixels()).fold(
        (0usize, 0usize),
        |(intersection, union), (a, b)| {
            let (a, b) = (a[0] > 0, b[0] > 0);
            (intersection + usize::from(a && b), union + usize::from(a || b))
        },
    );

    if union == 0 {
        return Ok(1.0);
    }

    Ok(intersection as f64 / union as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub index: usize,
    pub iou: f64,
}

/// Per-pair scores of an evaluation run.
#[derive(Debug, Clone, Default)]
pub struct IouReport {
    pub pairs: Vec<PairScore>,
}

impl IouReport {
    pub fn average(&self) -> Option<f64> {
        if self.pairs.is_empty() {
            return None;
        }

        let total: f64 = self.pairs.iter().map(|pair| pair.iou).sum();
        Some(total / self.pairs.len() as f64)
    }
}

impl fmt::Display for IouReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pair in self.pairs.iter() {
            writeln!(f, "IoU for pair {:2}:  {:.6}", pair.index, pair.iou)?;
        }

        match self.average() {
            Some(average) => write!(f, "Average IoU    :  {:.6}", average),
            None => write!(f, "Average IoU    :  n/a"),
        }
    }
}

/// Threshold both masks at [BINARY_THRESHOLD] and compute their IoU.
pub fn evaluate_pair(predicted: &Path, ground_truth: &Path) -> Result<f64> {
    let predicted = image::open(predicted)?.to_luma8();
    let ground_truth = image::open(ground_truth)?.to_luma8();

    iou(
        &threshold(&predicted, BINARY_THRESHOLD),
        &threshold(&ground_truth, BINARY_THRESHOLD),
    )
}

/// Score `pred_dir/output<i>.jpg` against `gt_dir/input<i>.jpg` for `i` in `1..=count`.
pub fn evaluate(pred_dir: &Path, gt_dir: &Path, count: usize) -> Result<IouReport> {
    let mut report = IouReport::default();

    for index in 1..=count {
        let predicted = pred_dir.join(format!("output{index}.jpg"));
        let ground_truth = gt_dir.join(format!("input{index}.jpg"));

        let iou = evaluate_pair(&predicted, &ground_truth)?;
        tracing::debug!("{} vs {}: {iou}", predicted.display(), ground_truth.display());
        report.pairs.push(PairScore { index, iou });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(width: u32, height: u32, water: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([if water(x, y) { 255 } else { 0 }]))
    }

    #[test]
    fn threshold_is_strict() {
        let image = GrayImage::from_raw(3, 1, vec![128, 129, 10]).unwrap();

        assert_eq!(threshold(&image, 128).into_raw(), vec![0, 255, 0]);
    }

    #[test]
    fn iou_of_overlapping_masks() {
        let predicted = mask(4, 1, |x, _| x < 2);
        let ground_truth = mask(4, 1, |x, _| x >= 1 && x < 3);

        assert!((iou(&predicted, &ground_truth).unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn iou_of_empty_masks_is_one() {
        assert_eq!(iou(&mask(3, 3, |_, _| false), &mask(3, 3, |_, _| false)).unwrap(), 1.0);
    }

    #[test]
    fn iou_rejects_size_mismatch() {
        let result = iou(&mask(3, 3, |_, _| true), &mask(3, 2, |_, _| true));

        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn report_formatting() {
        let report = IouReport {
            pairs: vec![
                PairScore { index: 1, iou: 0.5 },
                PairScore { index: 12, iou: 1.0 },
            ],
        };

        assert_eq!(
            report.to_string(),
            "IoU for pair  1:  0.500000\nIoU for pair 12:  1.000000\nAverage IoU    :  0.750000"
        );
    }

    #[test]
    fn evaluate_pairs_outputs_with_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let (pred_dir, gt_dir) = (dir.path().join("mask"), dir.path().join("gt"));
        std::fs::create_dir_all(&pred_dir).unwrap();
        std::fs::create_dir_all(&gt_dir).unwrap();

        // JPEG is lossy, so only check the scores are close to 1 and 0.
        for i in 1..=2 {
            mask(16, 16, |x, _| x < 8)
                .save(pred_dir.join(format!("output{i}.jpg")))
                .unwrap();
        }
        mask(16, 16, |x, _| x < 8)
            .save(gt_dir.join("input1.jpg"))
            .unwrap();
        mask(16, 16, |x, _| x >= 8)
            .save(gt_dir.join("input2.jpg"))
            .unwrap();

        let report = evaluate(&pred_dir, &gt_dir, 2).unwrap();

        assert_eq!(report.pairs.len(), 2);
        assert!(report.pairs[0].iou > 0.9);
        assert!(report.pairs[1].iou < 0.1);
    }

    #[test]
    fn evaluate_fails_on_missing_pair() {
        let dir = tempfile::tempdir().unwrap();

        assert!(evaluate(dir.path(), dir.path(), 1).is_err());
    }
}
