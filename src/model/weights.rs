//! Import of torchvision DeepLabV3 checkpoints.
//!
//! Only the backbone is imported: the classifier of the published weights
//! predicts 21 classes and is replaced by a freshly initialized two class head.

use std::path::Path;

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use super::deeplabv3::{Backbone, DeepLabV3};
use super::mobilenet::{LARGE_BLOCKS, MobileNetV3Record};
use super::resnet::ResNetRecord;
use crate::error::Result;

/// Key remaps from torchvision's `deeplabv3_resnet*` state dict to [ResNet](super::resnet::ResNet).
pub fn resnet_key_remaps() -> Vec<(String, String)> {
    [
        (r"^backbone\.(.+)", "$1"),
        (r"^layer([1-4])\.([0-9]+)\.(.+)", "layer$1.blocks.$2.$3"),
        (r"(.+)\.downsample\.0\.(.+)", "$1.downsample.conv.$2"),
        (r"(.+)\.downsample\.1\.(.+)", "$1.downsample.bn.$2"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (pattern.to_string(), replacement.to_string()))
    .collect()
}

/// Key remaps from torchvision's `deeplabv3_mobilenet_v3_large` state dict to
/// [MobileNetV3](super::mobilenet::MobileNetV3).
///
/// torchvision numbers the layers of every inverted residual block
/// sequentially, skipping the ones a block does not have, so the remaps are
/// derived from the block table.
pub fn mobilenet_key_remaps() -> Vec<(String, String)> {
    let mut remaps = conv_bn_remaps(r"^backbone\.0", "stem");

    for (index, setting) in LARGE_BLOCKS.iter().enumerate() {
        let source = format!(r"^backbone\.{}\.block", index + 1);
        let target = format!("blocks.{index}");
        let mut layer = 0;

        if setting.has_expansion() {
            remaps.extend(conv_bn_remaps(
                &format!(r"{source}\.{layer}"),
                &format!("{target}.expand"),
            ));
            layer += 1;
        }

        remaps.extend(conv_bn_remaps(
            &format!(r"{source}\.{layer}"),
            &format!("{target}.depthwise"),
        ));
        layer += 1;

        if setting.squeeze {
            remaps.push((
                format!(r"{source}\.{layer}\.(.+)"),
                format!("{target}.se.$1"),
            ));
            layer += 1;
        }

        remaps.extend(conv_bn_remaps(
            &format!(r"{source}\.{layer}"),
            &format!("{target}.project"),
        ));
    }

    remaps.extend(conv_bn_remaps(
        &format!(r"^backbone\.{}", LARGE_BLOCKS.len() + 1),
        "last",
    ));

    remaps
}

fn conv_bn_remaps(source: &str, target: &str) -> Vec<(String, String)> {
    vec![
        (format!(r"{source}\.0\.(.+)"), format!("{target}.conv.$1")),
        (format!(r"{source}\.1\.(.+)"), format!("{target}.bn.$1")),
    ]
}

fn load_args(path: &Path, remaps: &[(String, String)]) -> LoadArgs {
    remaps
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        })
}

/// Replace the backbone parameters of `model` with the ones stored in a
/// torchvision `.pth` checkpoint.
pub fn load_pretrained_backbone<B: Backend>(
    mut model: DeepLabV3<B>,
    path: &Path,
    device: &B::Device,
) -> Result<DeepLabV3<B>> {
    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();

    model.backbone = match model.backbone {
        Backbone::ResNet(resnet) => {
            let record: ResNetRecord<B> =
                recorder.load(load_args(path, &resnet_key_remaps()), device)?;
            Backbone::ResNet(resnet.load_record(record))
        }
        Backbone::MobileNetV3(mobilenet) => {
            let record: MobileNetV3Record<B> =
                recorder.load(load_args(path, &mobilenet_key_remaps()), device)?;
            Backbone::MobileNetV3(mobilenet.load_record(record))
        }
    };

    tracing::info!("Loaded pretrained backbone weights from {:?}", path);

    Ok(model)
}
