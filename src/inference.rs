use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::CompactRecorder,
    tensor::activation::softmax,
};
use image::{DynamicImage, GrayImage};

use crate::dataset::transform::normalize_rgb;
use crate::error::{Error, Result};
use crate::model::{DeepLabV3, DeepLabV3Config, WATER_CLASS, resize_bilinear};
use crate::postprocess::{binarize, probability_map, write_blend};

/// Runs a trained model on whole images and writes water masks.
pub struct Predictor<B: Backend> {
    model: DeepLabV3<B>,
    image_size: [usize; 2],
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// `image_size` is the `[height, width]` the model sees, whatever the
    /// size of the input image.
    pub fn new(model: DeepLabV3<B>, image_size: [usize; 2], device: B::Device) -> Self {
        Self {
            model,
            image_size,
            device,
        }
    }

    /// Rebuild the model described by `config` and load its weights from `checkpoint`.
    pub fn load(
        config: &DeepLabV3Config,
        image_size: [usize; 2],
        checkpoint: &Path,
        device: B::Device,
    ) -> Result<Self> {
        let model = config
            .init::<B>(&device)
            .load_file(checkpoint, &CompactRecorder::new(), &device)?;
        tracing::info!("Loaded {} model from {}", config.backbone.name(), checkpoint.display());

        Ok(Self::new(model, image_size, device))
    }

    /// Logits resized back to the resolution of `image`, `[num_classes, height, width]`.
    fn logits(&self, image: &DynamicImage) -> Tensor<B, 3> {
        let [height, width] = self.image_size;
        let data = normalize_rgb(image, self.image_size);

        let input = Tensor::<B, 1>::from_floats(data.as_slice(), &self.device)
            .reshape([1, 3, height, width]);
        let output = self.model.forward(input);

        let output = resize_bilinear(output, [image.height() as usize, image.width() as usize]);

        output.squeeze(0)
    }

    fn channel(scores: Tensor<B, 3>, index: usize) -> Vec<f32> {
        scores
            .narrow(0, index, 1)
            .into_data()
            .iter::<f32>()
            .collect()
    }

    /// Binary water mask of `image`, `255` for water and `0` elsewhere.
    pub fn predict(&self, image: &DynamicImage) -> GrayImage {
        let logits = self.logits(image);
        tracing::debug!("Output shape: {:?}", logits.dims());

        let water = Self::channel(logits, WATER_CLASS);
        binarize(&water, image.width(), image.height())
    }

    /// Write the mask of `image_path` to `mask_path` and its blend next to it.
    pub fn predict_file(&self, image_path: &Path, mask_path: &Path) -> Result<GrayImage> {
        let image = image::open(image_path)?;

        let mask = self.predict(&image);
        mask.save(mask_path)?;
        let blend = write_blend(image_path, mask_path)?;
        tracing::debug!("Wrote {} and {}", mask_path.display(), blend.display());

        Ok(mask)
    }

    /// Predict every `*.jpg` of `image_folder` into `mask_folder`.
    ///
    /// Returns the number of processed images.
    pub fn predict_folder(&self, image_folder: &Path, mask_folder: &Path) -> Result<usize> {
        if !image_folder.is_dir() {
            return Err(Error::MissingDirectory(image_folder.to_path_buf()));
        }
        std::fs::create_dir_all(mask_folder)?;

        let mut image_paths = Vec::new();
        for entry in std::fs::read_dir(image_folder)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "jpg") {
                image_paths.push(path);
            }
        }
        image_paths.sort();

        for image_path in image_paths.iter() {
            let mask_path = mask_folder.join(mask_name_for(image_path)?);
            tracing::info!("image: {}, mask: {}", image_path.display(), mask_path.display());
            self.predict_file(image_path, &mask_path)?;
        }

        Ok(image_paths.len())
    }

    /// Write the class probability maps of one image into `out_dir`, along
    /// with its ground truth when given.
    pub fn write_snapshot(
        &self,
        image_path: &Path,
        mask_path: Option<&Path>,
        out_dir: &Path,
    ) -> Result<()> {
        let image = image::open(image_path)?;
        let (width, height) = (image.width(), image.height());
        let probabilities = softmax(self.logits(&image), 0);

        for (index, name) in [(0, "monitor_background.png"), (WATER_CLASS, "monitor_water.png")] {
            let values = Self::channel(probabilities.clone(), index);
            probability_map(&values, width, height).save(out_dir.join(name))?;
        }

        if let Some(mask_path) = mask_path {
            image::open(mask_path)?
                .to_luma8()
                .save(out_dir.join("monitor_ground_truth.png"))?;
        }

        tracing::info!("Wrote monitoring snapshot of {}", image_path.display());
        Ok(())
    }
}

/// `input12.jpg` becomes `output12.jpg`: the first five characters of the
/// stem are replaced by `output`.
pub fn mask_name_for(image_path: &Path) -> Result<String> {
    let stem = image_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| Error::InvalidFileName(image_path.to_path_buf()))?;
    let suffix: String = stem.chars().skip(5).collect();

    Ok(format!("output{suffix}.jpg"))
}

/// Default location of the mask predicted for `image_path`.
pub fn default_mask_path(image_path: &Path) -> Result<PathBuf> {
    Ok(image_path.with_file_name(mask_name_for(image_path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackboneKind;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn predictor() -> Predictor<TestBackend> {
        let device = Default::default();
        let model = DeepLabV3Config::new(BackboneKind::MobileNetV3).init(&device);
        Predictor::new(model, [32, 32], device)
    }

    fn write_image(path: &Path, width: u32, height: u32) {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 90]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn mask_name_drops_input_prefix() {
        assert_eq!(mask_name_for(Path::new("a/input12.jpg")).unwrap(), "output12.jpg");
        assert_eq!(mask_name_for(Path::new("img.jpg")).unwrap(), "output.jpg");
        assert_eq!(
            default_mask_path(Path::new("data/input3.jpg")).unwrap(),
            PathBuf::from("data/output3.jpg")
        );
    }

    #[test]
    fn predict_keeps_source_size_and_is_binary() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 24, |x, _| {
            Rgb([(x * 6) as u8, 120, 30])
        }));

        let mask = predictor().predict(&image);

        assert_eq!(mask.dimensions(), (40, 24));
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn predict_folder_writes_masks_and_blends() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let masks = dir.path().join("masks");
        std::fs::create_dir_all(&images).unwrap();
        write_image(&images.join("input1.jpg"), 16, 12);
        write_image(&images.join("input2.jpg"), 16, 12);
        std::fs::write(images.join("notes.txt"), b"skip").unwrap();

        let count = predictor().predict_folder(&images, &masks).unwrap();

        assert_eq!(count, 2);
        for i in 1..=2 {
            let mask = image::open(masks.join(format!("output{i}.jpg"))).unwrap();
            assert_eq!((mask.width(), mask.height()), (16, 12));
            assert!(masks.join(format!("outputblend{i}.png")).exists());
        }
    }

    #[test]
    fn predict_folder_requires_directory() {
        let dir = tempfile::tempdir().unwrap();

        let result = predictor().predict_folder(&dir.path().join("missing"), dir.path());

        assert!(matches!(result, Err(Error::MissingDirectory(_))));
    }

    #[test]
    fn snapshot_writes_probability_maps() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("input1.png");
        let mask_path = dir.path().join("mask1.png");
        write_image(&image_path, 20, 10);
        GrayImage::new(20, 10).save(&mask_path).unwrap();

        predictor()
            .write_snapshot(&image_path, Some(&mask_path), dir.path())
            .unwrap();

        for name in [
            "monitor_background.png",
            "monitor_water.png",
            "monitor_ground_truth.png",
        ] {
            let written = image::open(dir.path().join(name)).unwrap();
            assert_eq!((written.width(), written.height()), (20, 10));
        }
    }

    #[test]
    fn load_restores_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = DeepLabV3Config::new(BackboneKind::MobileNetV3);
        let path = dir.path().join("mobilenetv3");
        config
            .init::<TestBackend>(&device)
            .save_file(&path, &CompactRecorder::new())
            .unwrap();

        let predictor = Predictor::<TestBackend>::load(&config, [32, 32], &path, device).unwrap();

        assert_eq!(predictor.model.num_classes(), 2);
    }
}
