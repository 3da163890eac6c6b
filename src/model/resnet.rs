//! Dilated ResNet backbone.
//!
//! Derived from torchvision.models.resnet with `replace_stride_with_dilation =
//! [false, true, true]`: the last two stages keep the resolution of stage two
//! and grow their dilation instead, for an output stride of 8.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];

const EXPANSION: usize = 4;

/// Channels of the last stage.
pub const RESNET_OUT_CHANNELS: usize = 512 * EXPANSION;

fn initializer() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

/// Bottleneck residual block, stride on the 3x3 convolution (ResNet V1.5).
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    relu: Relu,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        self.relu.forward(out + identity)
    }

    fn new(
        in_channels: usize,
        planes: usize,
        stride: usize,
        dilation: usize,
        device: &B::Device,
    ) -> Self {
        let out_channels = planes * EXPANSION;

        let conv1 = Conv2dConfig::new([in_channels, planes], [1, 1])
            .with_bias(false)
            .with_initializer(initializer())
            .init(device);
        let conv2 = Conv2dConfig::new([planes, planes], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
            .with_dilation([dilation, dilation])
            .with_bias(false)
            .with_initializer(initializer())
            .init(device);
        let conv3 = Conv2dConfig::new([planes, out_channels], [1, 1])
            .with_bias(false)
            .with_initializer(initializer())
            .init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1: BatchNormConfig::new(planes).init(device),
            conv2,
            bn2: BatchNormConfig::new(planes).init(device),
            conv3,
            bn3: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            downsample,
        }
    }
}

/// 1x1 projection of the identity path.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }

    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_bias(false)
            .with_initializer(initializer())
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<Bottleneck<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |out, block| block.forward(out))
    }
}

/// Tracks the running dilation while the stages are built.
struct LayerBuilder {
    in_channels: usize,
    dilation: usize,
}

impl LayerBuilder {
    fn layer<B: Backend>(
        &mut self,
        planes: usize,
        num_blocks: usize,
        stride: usize,
        dilate: bool,
        device: &B::Device,
    ) -> LayerBlock<B> {
        let previous_dilation = self.dilation;
        let stride = if dilate {
            self.dilation *= stride;
            1
        } else {
            stride
        };

        let mut blocks = Vec::with_capacity(num_blocks);
        blocks.push(Bottleneck::new(
            self.in_channels,
            planes,
            stride,
            previous_dilation,
            device,
        ));
        self.in_channels = planes * EXPANSION;

        for _ in 1..num_blocks {
            blocks.push(Bottleneck::new(
                self.in_channels,
                planes,
                1,
                self.dilation,
                device,
            ));
        }

        LayerBlock { blocks }
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: LayerBlock<B>,
    layer2: LayerBlock<B>,
    layer3: LayerBlock<B>,
    layer4: LayerBlock<B>,
}

impl<B: Backend> ResNet<B> {
    /// Features of the last stage, `[batch, 2048, height / 8, width / 8]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.maxpool.forward(out);

        let out = self.layer1.forward(out);
        let out = self.layer2.forward(out);
        let out = self.layer3.forward(out);
        self.layer4.forward(out)
    }

    pub fn resnet50(device: &B::Device) -> Self {
        Self::new(RESNET50_BLOCKS, device)
    }

    pub fn resnet101(device: &B::Device) -> Self {
        Self::new(RESNET101_BLOCKS, device)
    }

    fn new(blocks: [usize; 4], device: &B::Device) -> Self {
        // 7x7 conv, stride 2, followed by a 3x3 max pool, stride 2
        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer())
            .init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut builder = LayerBuilder {
            in_channels: 64,
            dilation: 1,
        };

        Self {
            conv1,
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool,
            layer1: builder.layer(64, blocks[0], 1, false, device),
            layer2: builder.layer(128, blocks[1], 2, false, device),
            layer3: builder.layer(256, blocks[2], 2, true, device),
            layer4: builder.layer(512, blocks[3], 2, true, device),
        }
    }
}
