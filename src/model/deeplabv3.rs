use std::str::FromStr;

use burn::prelude::*;

#[cfg(feature = "training")]
use crate::{
    dataset::SegmentationBatch,
    training::{SegmentationOutput, loss::SegmentationCrossEntropyLossConfig},
};
#[cfg(feature = "training")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};

use super::head::{DeepLabHead, DeepLabHeadConfig};
use super::mobilenet::{MOBILENET_OUT_CHANNELS, MobileNetV3};
use super::resize::resize_bilinear;
use super::resnet::{RESNET_OUT_CHANNELS, ResNet};
use crate::error::Error;

/// Channel of the logits that holds the water class.
pub const WATER_CLASS: usize = 1;

#[derive(Config, Debug, PartialEq, Eq)]
pub enum BackboneKind {
    ResNet50,
    ResNet101,
    MobileNetV3,
}

impl BackboneKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackboneKind::ResNet50 => "resnet50",
            BackboneKind::ResNet101 => "resnet101",
            BackboneKind::MobileNetV3 => "mobilenetv3",
        }
    }

    pub fn out_channels(&self) -> usize {
        match self {
            BackboneKind::ResNet50 | BackboneKind::ResNet101 => RESNET_OUT_CHANNELS,
            BackboneKind::MobileNetV3 => MOBILENET_OUT_CHANNELS,
        }
    }
}

impl FromStr for BackboneKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "resnet50" => Ok(BackboneKind::ResNet50),
            "resnet101" => Ok(BackboneKind::ResNet101),
            "mobilenetv3" => Ok(BackboneKind::MobileNetV3),
            _ => Err(Error::UnknownModel(name.to_string())),
        }
    }
}

/// Feature extractor.
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    ResNet(ResNet<B>),
    MobileNetV3(MobileNetV3<B>),
}

impl<B: Backend> Backbone<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Backbone::ResNet(resnet) => resnet.forward(images),
            Backbone::MobileNetV3(mobilenet) => mobilenet.forward(images),
        }
    }

    fn new(kind: &BackboneKind, device: &B::Device) -> Self {
        match kind {
            BackboneKind::ResNet50 => Backbone::ResNet(ResNet::resnet50(device)),
            BackboneKind::ResNet101 => Backbone::ResNet(ResNet::resnet101(device)),
            BackboneKind::MobileNetV3 => Backbone::MobileNetV3(MobileNetV3::large(device)),
        }
    }
}

#[derive(Module, Debug)]
pub struct DeepLabV3<B: Backend> {
    pub(crate) backbone: Backbone<B>,
    head: DeepLabHead<B>,
    num_classes: usize,
}

#[derive(Config, Debug)]
pub struct DeepLabV3Config {
    pub backbone: BackboneKind,
    #[config(default = "2")]
    pub num_classes: usize,
}

impl DeepLabV3Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DeepLabV3<B> {
        DeepLabV3 {
            backbone: Backbone::new(&self.backbone, device),
            head: DeepLabHeadConfig::new(self.backbone.out_channels(), self.num_classes)
                .init(device),
            num_classes: self.num_classes,
        }
    }
}

impl<B: Backend> DeepLabV3<B> {
    /// Per-class logits at the resolution of `images`.
    ///
    /// # Shapes
    ///
    /// - images: `[batch_size, 3, height, width]`
    /// - output: `[batch_size, num_classes, height, width]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = images.dims();

        let features = self.backbone.forward(images);
        let logits = self.head.forward(features);

        resize_bilinear(logits, [height, width])
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[cfg(feature = "training")]
    pub fn forward_segmentation(&self, item: SegmentationBatch<B>) -> SegmentationOutput<B> {
        let targets = item.masks;
        let output = self.forward(item.images);

        let loss = SegmentationCrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        SegmentationOutput::new(loss, output, targets)
    }
}

#[cfg(feature = "training")]
impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, SegmentationOutput<B>> for DeepLabV3<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "training")]
impl<B: Backend> ValidStep<SegmentationBatch<B>, SegmentationOutput<B>> for DeepLabV3<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn backbone_names_parse_case_insensitively() {
        assert_eq!(
            "ResNet50".parse::<BackboneKind>().unwrap(),
            BackboneKind::ResNet50
        );
        assert_eq!(
            "resnet101".parse::<BackboneKind>().unwrap(),
            BackboneKind::ResNet101
        );
        assert_eq!(
            "MOBILENETV3".parse::<BackboneKind>().unwrap(),
            BackboneKind::MobileNetV3
        );
        assert!(matches!(
            "vgg16".parse::<BackboneKind>(),
            Err(Error::UnknownModel(name)) if name == "vgg16"
        ));
    }

    #[test]
    fn head_width_follows_backbone() {
        assert_eq!(BackboneKind::ResNet101.out_channels(), 2048);
        assert_eq!(BackboneKind::MobileNetV3.out_channels(), 960);
    }

    #[test]
    fn logits_match_input_resolution() {
        let device = Default::default();
        let model = DeepLabV3Config::new(BackboneKind::MobileNetV3).init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::random(
            [1, 3, 48, 40],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [1, 2, 48, 40]);
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn resnet_logits_match_input_resolution() {
        let device = Default::default();
        let model = DeepLabV3Config::new(BackboneKind::ResNet50).init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::random(
            [1, 3, 32, 32],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        assert_eq!(model.forward(images).dims(), [1, 2, 32, 32]);
    }

    #[cfg(feature = "training")]
    #[test]
    fn train_step_backpropagates_on_ndarray() {
        type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

        let device = Default::default();
        let model =
            DeepLabV3Config::new(BackboneKind::MobileNetV3).init::<TestAutodiffBackend>(&device);
        let batch = SegmentationBatch {
            images: Tensor::random([2, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device),
            masks: Tensor::<TestAutodiffBackend, 4, Int>::ones([2, 1, 32, 32], &device),
        };

        let output = TrainStep::step(&model, batch);

        assert_eq!(output.item.logits.dims(), [2, 2, 32, 32]);
    }
}
