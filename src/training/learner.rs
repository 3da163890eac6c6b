use burn::{
    backend::NdArray,
    prelude::*,
    tensor::{Int, Transaction},
    train::metric::{Adaptor, ItemLazy, LossInput},
};
use derive_new::new;

use super::metrics::IoUInput;

/// Result of one training or validation step, consumed by the learner's metrics.
#[derive(new)]
pub struct SegmentationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    /// `[batch_size, num_classes, height, width]`
    pub logits: Tensor<B, 4>,
    /// Target class indices, `[batch_size, 1, height, width]`.
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = SegmentationOutput<NdArray>;

    /// Read the three tensors back in a single transaction so metrics run on the CPU.
    fn sync(self) -> Self::ItemSync {
        let [loss, logits, masks] = Transaction::default()
            .register(self.loss)
            .register(self.logits)
            .register(self.masks)
            .execute()
            .try_into()
            .expect("Transaction returns one record per registered tensor");

        let device = &Default::default();

        SegmentationOutput::new(
            Tensor::from_data(loss, device),
            Tensor::from_data(logits, device),
            Tensor::from_data(masks, device),
        )
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<IoUInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> IoUInput<B> {
        IoUInput::new(self.logits.clone(), self.masks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn sync_keeps_values() {
        let device = Default::default();
        let output = SegmentationOutput::<TestBackend>::new(
            Tensor::from_floats([0.25], &device),
            Tensor::<TestBackend, 1>::from_floats([1., 2., 3., 4.], &device).reshape([1, 2, 1, 2]),
            Tensor::<TestBackend, 1, Int>::from_ints([0, 1], &device).reshape([1, 1, 1, 2]),
        );

        let synced = output.sync();

        assert_eq!(synced.logits.dims(), [1, 2, 1, 2]);
        assert_eq!(synced.masks.into_data().to_vec::<i64>().unwrap(), vec![0, 1]);
        synced
            .loss
            .into_data()
            .assert_approx_eq(&TensorData::from([0.25f32]), 3);
    }
}
