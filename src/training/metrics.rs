use std::marker::PhantomData;

use burn::prelude::*;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};
use derive_new::new;

use crate::model::WATER_CLASS;

/// Intersection over union of the water class, in percent.
pub struct IoUMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

#[derive(new)]
pub struct IoUInput<B: Backend> {
    /// `[batch_size, num_classes, height, width]`
    outputs: Tensor<B, 4>,
    /// `[batch_size, 1, height, width]`
    targets: Tensor<B, 4, Int>,
}

impl<B: Backend> Default for IoUMetric<B> {
    fn default() -> Self {
        Self {
            state: NumericMetricState::default(),
            _b: PhantomData,
        }
    }
}

impl<B: Backend> IoUMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// IoU of `class_index` between the argmax of `outputs` and `targets`.
///
/// Returns `1.0` when the class is absent from both.
pub fn class_iou<B: Backend>(
    outputs: Tensor<B, 4>,
    targets: Tensor<B, 4, Int>,
    class_index: usize,
) -> f64 {
    let predictions = outputs.argmax(1);

    let pred_mask = predictions.equal_elem(class_index as i64).float();
    let target_mask = targets.equal_elem(class_index as i64).float();

    let intersection = (pred_mask.clone() * target_mask.clone())
        .sum()
        .into_scalar()
        .elem::<f64>();
    let union = (pred_mask.clone() + target_mask.clone() - pred_mask * target_mask)
        .sum()
        .into_scalar()
        .elem::<f64>();

    if union > 0.0 {
        intersection / union
    } else {
        1.0
    }
}

impl<B: Backend> Metric for IoUMetric<B> {
    type Input = IoUInput<B>;
    const NAME: &'static str = "IoU";

    fn update(&mut self, input: &IoUInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _, _, _] = input.outputs.dims();

        let iou = class_iou(
            input.outputs.clone(),
            input.targets.clone(),
            WATER_CLASS,
        );

        self.state.update(
            100.0 * iou,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for IoUMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
