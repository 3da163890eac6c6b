//! Segmentation Cross Entropy Loss
//!
//! Pixel-wise counterpart of burn's CrossEntropyLoss: predictions keep their
//! spatial dimensions and targets are class index maps.

use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
    tensor::activation::log_softmax,
};

/// Configuration to create a [Segmentation Cross-entropy loss](SegmentationCrossEntropyLoss) using the [init function](SegmentationCrossEntropyLossConfig::init).
#[derive(Config, Debug)]
pub struct SegmentationCrossEntropyLossConfig {
    /// Create weighted cross-entropy.
    ///
    /// The loss of a pixel is multiplied by the weight of its target class and
    /// the sum is normalized by the total weight of the counted pixels.
    ///
    /// # Pre-conditions
    ///   - The order of the weight vector should correspond to the label integer assignment.
    ///   - All weights are positive.
    pub weights: Option<Vec<f32>>,

    /// Pixels whose target equals this index do not contribute to the loss.
    pub ignore_index: Option<usize>,
}

impl SegmentationCrossEntropyLossConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegmentationCrossEntropyLoss<B> {
        self.assertions();
        SegmentationCrossEntropyLoss {
            weights: self
                .weights
                .as_ref()
                .map(|e| Tensor::<B, 1>::from_floats(e.as_slice(), device)),
            ignore_index: self.ignore_index,
        }
    }

    fn assertions(&self) {
        if let Some(weights) = self.weights.as_ref() {
            assert!(
                weights.iter().all(|e| e > &0.),
                "Weights of cross-entropy have to be positive."
            );
        }
    }
}

/// Mean cross entropy between per-pixel logits and class index maps.
///
/// Should be created using [SegmentationCrossEntropyLossConfig]
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct SegmentationCrossEntropyLoss<B: Backend> {
    /// Weights for cross-entropy.
    pub weights: Option<Tensor<B, 1>>,
    /// Ignore specific index during loss calculation.
    pub ignore_index: Option<usize>,
}

impl<B: Backend> ModuleDisplay for SegmentationCrossEntropyLoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("weights", &self.weights)
            .add("ignore_index", &self.ignore_index)
            .optional()
    }
}

impl<B: Backend> SegmentationCrossEntropyLoss<B> {
    /// Compute the criterion on the input tensor.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes, height, width]`
    /// - targets: `[batch_size, 1, height, width]` (integer class indices)
    /// - output: `[1]`
    pub fn forward(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        Self::assertions(&logits, &targets);

        let [batch_size, num_classes, height, width] = logits.dims();
        let total_elements = batch_size * height * width;
        let device = &logits.device();

        let logits = logits
            .reshape([batch_size, num_classes, height * width])
            .swap_dims(1, 2)
            .reshape([total_elements, num_classes]);
        let targets = targets.reshape([total_elements]);

        let ignored = match self.ignore_index {
            Some(ignore_index) => Some(targets.clone().equal_elem(ignore_index as i32)),
            None => None,
        };

        // Ignored pixels may carry an out of range index, gather from class 0 instead.
        let targets = match &ignored {
            Some(ignored) => targets.mask_fill(ignored.clone(), 0),
            None => targets,
        };

        let log_probs = log_softmax(logits, 1)
            .gather(1, targets.clone().reshape([total_elements, 1]))
            .reshape([total_elements]);

        let weights = match &self.weights {
            Some(weights) => weights.clone().gather(0, targets),
            None => Tensor::ones([total_elements], device),
        };
        let weights = match ignored {
            Some(ignored) => weights.mask_fill(ignored, 0.0),
            None => weights,
        };

        let loss = (log_probs * weights.clone()).sum().neg();
        loss / weights.sum().clamp_min(f32::EPSILON)
    }

    fn assertions(logits: &Tensor<B, 4>, targets: &Tensor<B, 4, Int>) {
        let [pred_batch, _pred_classes, pred_height, pred_width] = logits.dims();
        let [target_batch, target_channels, target_height, target_width] = targets.dims();

        assert_eq!(
            pred_batch, target_batch,
            "Batch size mismatch: predictions ({}) vs targets ({})",
            pred_batch, target_batch
        );

        assert_eq!(
            target_channels, 1,
            "Target should have exactly 1 channel, got {}",
            target_channels
        );

        assert_eq!(
            (pred_height, pred_width),
            (target_height, target_width),
            "Spatial dimensions mismatch: predictions ({},{}) vs targets ({},{})",
            pred_height,
            pred_width,
            target_height,
            target_width
        );
    }
}
