mod deeplabv3;
mod head;
pub mod mobilenet;
mod resize;
pub mod resnet;
#[cfg(feature = "pretrained")]
pub mod weights;

pub use deeplabv3::{Backbone, BackboneKind, DeepLabV3, DeepLabV3Config, WATER_CLASS};
pub use head::{Aspp, AsppBranch, DeepLabHead, DeepLabHeadConfig};
pub use mobilenet::MobileNetV3;
pub use resize::resize_bilinear;
pub use resnet::ResNet;

#[cfg(feature = "pretrained")]
pub use weights::load_pretrained_backbone;
