use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    },
    prelude::*,
};

const ASPP_CHANNELS: usize = 256;
const ATROUS_RATES: [usize; 3] = [12, 24, 36];

/// Convolution, batch norm and ReLU, the shape shared by every ASPP branch.
#[derive(Module, Debug)]
pub struct AsppBranch<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> AsppBranch<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }

    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dilation: usize,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel_size - 1) / 2 * dilation;

        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_dilation([dilation, dilation])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }
}

/// Atrous Spatial Pyramid Pooling.
#[derive(Module, Debug)]
pub struct Aspp<B: Backend> {
    pointwise: AsppBranch<B>,
    atrous: Vec<AsppBranch<B>>,
    pool: AdaptiveAvgPool2d,
    pool_projection: AsppBranch<B>,
    project: AsppBranch<B>,
    dropout: Dropout,
}

impl<B: Backend> Aspp<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();

        let mut branches = Vec::with_capacity(self.atrous.len() + 2);
        branches.push(self.pointwise.forward(x.clone()));
        for branch in &self.atrous {
            branches.push(branch.forward(x.clone()));
        }

        // Upsampling a 1x1 map is a broadcast.
        let pooled = self.pool_projection.forward(self.pool.forward(x));
        branches.push(pooled.repeat_dim(2, height).repeat_dim(3, width));

        let x = self.project.forward(Tensor::cat(branches, 1));
        self.dropout.forward(x)
    }

    fn new(in_channels: usize, device: &B::Device) -> Self {
        let atrous = ATROUS_RATES
            .iter()
            .map(|&rate| AsppBranch::new(in_channels, ASPP_CHANNELS, 3, rate, device))
            .collect::<Vec<_>>();
        let num_branches = atrous.len() + 2;

        Self {
            pointwise: AsppBranch::new(in_channels, ASPP_CHANNELS, 1, 1, device),
            atrous,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            pool_projection: AsppBranch::new(in_channels, ASPP_CHANNELS, 1, 1, device),
            project: AsppBranch::new(num_branches * ASPP_CHANNELS, ASPP_CHANNELS, 1, 1, device),
            dropout: DropoutConfig::new(0.5).init(),
        }
    }
}

/// ASPP followed by a 3x3 refinement and a 1x1 classifier.
#[derive(Module, Debug)]
pub struct DeepLabHead<B: Backend> {
    aspp: Aspp<B>,
    refine: AsppBranch<B>,
    classifier: Conv2d<B>,
}

#[derive(Config, Debug)]
pub struct DeepLabHeadConfig {
    in_channels: usize,
    num_classes: usize,
}

impl DeepLabHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DeepLabHead<B> {
        DeepLabHead {
            aspp: Aspp::new(self.in_channels, device),
            refine: AsppBranch::new(ASPP_CHANNELS, ASPP_CHANNELS, 3, 1, device),
            classifier: Conv2dConfig::new([ASPP_CHANNELS, self.num_classes], [1, 1]).init(device),
        }
    }
}

impl<B: Backend> DeepLabHead<B> {
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.aspp.forward(features);
        let x = self.refine.forward(x);
        self.classifier.forward(x)
    }
}
