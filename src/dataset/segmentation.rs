use burn::{data::dataloader::batcher::Batcher, prelude::*};
use derive_new::new;

use super::WaterItem;

#[derive(Clone, new)]
pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
}

#[derive(Clone, Debug)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4, Float>,
    /// `[batch_size, 1, height, width]`, class indices.
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> Batcher<WaterItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<WaterItem>) -> SegmentationBatch<B> {
        let mut images = Vec::with_capacity(items.len());
        let mut masks = Vec::with_capacity(items.len());

        for item in items {
            let [height, width] = item.size;

            let image_tensor = Tensor::<B, 3>::from_data(
                TensorData::new(item.image, Shape::new([3, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            );

            let int_mask: Vec<i32> = item.mask.iter().map(|&class| class as i32).collect();
            let mask_tensor = Tensor::<B, 3, Int>::from_data(
                TensorData::new(int_mask, Shape::new([1, height, width])).convert::<B::IntElem>(),
                &self.device,
            );

            images.push(image_tensor);
            masks.push(mask_tensor);
        }

        let images: Tensor<B, 4> = Tensor::stack::<4>(images, 0);
        let masks: Tensor<B, 4, Int> = Tensor::stack::<4>(masks, 0);

        SegmentationBatch { images, masks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn batch_stacks_items() {
        let item = WaterItem {
            image: vec![0.5; 3 * 2 * 3],
            mask: vec![0, 1, 1, 0, 0, 1],
            size: [2, 3],
        };
        let batcher = SegmentationBatcher::<TestBackend>::new(Default::default());

        let batch = batcher.batch(vec![item.clone(), item]);

        assert_eq!(batch.images.dims(), [2, 3, 2, 3]);
        assert_eq!(batch.masks.dims(), [2, 1, 2, 3]);
        assert_eq!(batch.masks.sum().into_scalar(), 6);
    }
}
