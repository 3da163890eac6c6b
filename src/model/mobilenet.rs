//! Dilated MobileNetV3-Large backbone.
//!
//! Derived from torchvision.models.mobilenetv3 with `dilated = true`: the last
//! stage trades its stride for a dilation of 2, for an output stride of 16.

use burn::{
    module::Ignored,
    nn::{
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    },
    prelude::*,
};

const BN_EPSILON: f64 = 1e-3;
const BN_MOMENTUM: f64 = 0.01;

/// Channels of the final 1x1 convolution.
pub const MOBILENET_OUT_CHANNELS: usize = 960;

const STEM_CHANNELS: usize = 16;
const LAST_STAGE_DILATION: usize = 2;

/// One inverted residual block of the network table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSetting {
    pub input: usize,
    pub kernel: usize,
    pub expanded: usize,
    pub output: usize,
    pub squeeze: bool,
    pub hard_swish: bool,
    pub stride: usize,
    pub dilation: usize,
}

impl BlockSetting {
    const fn new(
        input: usize,
        kernel: usize,
        expanded: usize,
        output: usize,
        squeeze: bool,
        hard_swish: bool,
        stride: usize,
        dilation: usize,
    ) -> Self {
        Self {
            input,
            kernel,
            expanded,
            output,
            squeeze,
            hard_swish,
            stride,
            dilation,
        }
    }

    pub fn has_expansion(&self) -> bool {
        self.expanded != self.input
    }
}

/// The MobileNetV3-Large table.
pub const LARGE_BLOCKS: [BlockSetting; 15] = [
    BlockSetting::new(16, 3, 16, 16, false, false, 1, 1),
    BlockSetting::new(16, 3, 64, 24, false, false, 2, 1),
    BlockSetting::new(24, 3, 72, 24, false, false, 1, 1),
    BlockSetting::new(24, 5, 72, 40, true, false, 2, 1),
    BlockSetting::new(40, 5, 120, 40, true, false, 1, 1),
    BlockSetting::new(40, 5, 120, 40, true, false, 1, 1),
    BlockSetting::new(40, 3, 240, 80, false, true, 2, 1),
    BlockSetting::new(80, 3, 200, 80, false, true, 1, 1),
    BlockSetting::new(80, 3, 184, 80, false, true, 1, 1),
    BlockSetting::new(80, 3, 184, 80, false, true, 1, 1),
    BlockSetting::new(80, 3, 480, 112, true, true, 1, 1),
    BlockSetting::new(112, 3, 672, 112, true, true, 1, 1),
    BlockSetting::new(112, 5, 672, 160, true, true, 2, LAST_STAGE_DILATION),
    BlockSetting::new(160, 5, 960, 160, true, true, 1, LAST_STAGE_DILATION),
    BlockSetting::new(160, 5, 960, 160, true, true, 1, LAST_STAGE_DILATION),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    HardSwish,
    Identity,
}

pub fn hard_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.add_scalar(3.0).clamp(0.0, 6.0).div_scalar(6.0)
}

pub fn hard_swish<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone() * hard_sigmoid(x)
}

/// Round `value` to the nearest multiple of `divisor`, never going below 90% of it.
fn make_divisible(value: usize, divisor: usize) -> usize {
    let rounded = ((value + divisor / 2) / divisor * divisor).max(divisor);
    if (rounded as f64) < 0.9 * value as f64 {
        rounded + divisor
    } else {
        rounded
    }
}

#[derive(Module, Debug)]
pub struct ConvBnActivation<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    activation: Ignored<Activation>,
}

impl<B: Backend> ConvBnActivation<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.bn.forward(self.conv.forward(x));

        match self.activation.0 {
            Activation::Relu => Relu::new().forward(x),
            Activation::HardSwish => hard_swish(x),
            Activation::Identity => x,
        }
    }
}

#[derive(Config, Debug)]
pub struct ConvBnActivationConfig {
    channels: [usize; 2],
    #[config(default = 1)]
    kernel: usize,
    #[config(default = 1)]
    stride: usize,
    #[config(default = 1)]
    dilation: usize,
    #[config(default = 1)]
    groups: usize,
}

impl ConvBnActivationConfig {
    pub fn init<B: Backend>(
        &self,
        activation: Activation,
        device: &B::Device,
    ) -> ConvBnActivation<B> {
        let padding = (self.kernel - 1) / 2 * self.dilation;

        ConvBnActivation {
            conv: Conv2dConfig::new(self.channels, [self.kernel, self.kernel])
                .with_stride([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_dilation([self.dilation, self.dilation])
                .with_groups(self.groups)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(self.channels[1])
                .with_epsilon(BN_EPSILON)
                .with_momentum(BN_MOMENTUM)
                .init(device),
            activation: Ignored(activation),
        }
    }
}

#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    avg_pool: AdaptiveAvgPool2d,
    fc1: Conv2d<B>,
    fc2: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> SqueezeExcitation<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();

        let scale = self.avg_pool.forward(x.clone());
        let scale = self.relu.forward(self.fc1.forward(scale));
        let scale = hard_sigmoid(self.fc2.forward(scale));

        x * scale.repeat_dim(2, height).repeat_dim(3, width)
    }

    fn new(channels: usize, device: &B::Device) -> Self {
        let squeezed = make_divisible(channels / 4, 8);

        Self {
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            fc2: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    expand: Option<ConvBnActivation<B>>,
    depthwise: ConvBnActivation<B>,
    se: Option<SqueezeExcitation<B>>,
    project: ConvBnActivation<B>,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };
        let out = self.depthwise.forward(out);
        let out = match &self.se {
            Some(se) => se.forward(out),
            None => out,
        };
        let out = self.project.forward(out);

        if self.use_residual { out + input } else { out }
    }

    fn new(setting: &BlockSetting, device: &B::Device) -> Self {
        let activation = if setting.hard_swish {
            Activation::HardSwish
        } else {
            Activation::Relu
        };
        let stride = if setting.dilation > 1 { 1 } else { setting.stride };

        let expand = setting.has_expansion().then(|| {
            ConvBnActivationConfig::new([setting.input, setting.expanded]).init(activation, device)
        });

        let depthwise = ConvBnActivationConfig::new([setting.expanded, setting.expanded])
            .with_kernel(setting.kernel)
            .with_stride(stride)
            .with_dilation(setting.dilation)
            .with_groups(setting.expanded)
            .init(activation, device);

        let se = setting
            .squeeze
            .then(|| SqueezeExcitation::new(setting.expanded, device));

        let project = ConvBnActivationConfig::new([setting.expanded, setting.output])
            .init(Activation::Identity, device);

        Self {
            expand,
            depthwise,
            se,
            project,
            use_residual: setting.stride == 1 && setting.input == setting.output,
        }
    }
}

#[derive(Module, Debug)]
pub struct MobileNetV3<B: Backend> {
    stem: ConvBnActivation<B>,
    blocks: Vec<InvertedResidual<B>>,
    last: ConvBnActivation<B>,
}

impl<B: Backend> MobileNetV3<B> {
    /// Features of the last layer, `[batch, 960, height / 16, width / 16]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.stem.forward(input);
        let out = self
            .blocks
            .iter()
            .fold(out, |out, block| block.forward(out));

        self.last.forward(out)
    }

    pub fn large(device: &B::Device) -> Self {
        let stem = ConvBnActivationConfig::new([3, STEM_CHANNELS])
            .with_kernel(3)
            .with_stride(2)
            .init(Activation::HardSwish, device);

        let blocks = LARGE_BLOCKS
            .iter()
            .map(|setting| InvertedResidual::new(setting, device))
            .collect();

        let last_input = LARGE_BLOCKS[LARGE_BLOCKS.len() - 1].output;
        let last = ConvBnActivationConfig::new([last_input, MOBILENET_OUT_CHANNELS])
            .init(Activation::HardSwish, device);

        Self { stem, blocks, last }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f32>;

    #[test]
    fn make_divisible_matches_reference_values() {
        assert_eq!(make_divisible(72 / 4, 8), 24);
        assert_eq!(make_divisible(120 / 4, 8), 32);
        assert_eq!(make_divisible(672 / 4, 8), 168);
        assert_eq!(make_divisible(960 / 4, 8), 240);
    }

    #[test]
    fn hard_activations() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-4.0, 0.0, 1.5, 4.0], &device);

        hard_sigmoid(x.clone())
            .into_data()
            .assert_approx_eq(&TensorData::from([0.0, 0.5, 0.75, 1.0]), 3);
        hard_swish(x)
            .into_data()
            .assert_approx_eq(&TensorData::from([0.0, 0.0, 1.125, 4.0]), 3);
    }

    #[test]
    fn mobilenet_has_output_stride_sixteen() {
        let device = Default::default();
        let model = MobileNetV3::<TestBackend>::large(&device);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward(input);

        assert_eq!(output.dims(), [1, MOBILENET_OUT_CHANNELS, 4, 4]);
    }
}
