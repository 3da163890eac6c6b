use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::transform::{PartialDataset, ShuffledDataset};
use burn::data::dataset::{Dataset, InMemDataset};
use burn::prelude::*;

use super::transform::{binarize_mask, normalize_rgb};
use crate::error::{self, Error};

/// A preprocessed image/mask pair.
#[derive(Clone, Debug)]
pub struct WaterItem {
    /// Normalized image, `[3, height, width]`.
    pub image: Vec<f32>,
    /// Class indices, `[height, width]`.
    pub mask: Vec<u8>,
    /// `[height, width]`
    pub size: [usize; 2],
}

#[derive(Config, Debug)]
pub struct WaterDatasetConfig {
    pub image_folder: String,
    pub mask_folder: String,
    #[config(default = "[520, 520]")]
    pub image_size: [usize; 2],
    /// Mask luma at or above which a pixel counts as water.
    #[config(default = 128)]
    pub mask_threshold: u8,
}

impl Default for WaterDatasetConfig {
    fn default() -> Self {
        Self::new("image".to_string(), "mask".to_string())
    }
}

pub type WaterSplit = PartialDataset<Arc<ShuffledDataset<WaterDataset, WaterItem>>, WaterItem>;

/// Image/mask pairs loaded eagerly into memory.
pub struct WaterDataset {
    dataset: InMemDataset<WaterItem>,
}

impl Dataset<WaterItem> for WaterDataset {
    fn get(&self, index: usize) -> Option<WaterItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl WaterDataset {
    /// Load every pair found under `root`.
    ///
    /// Both folders are sorted by the number following the last `_` of each
    /// file stem and paired in that order.
    pub fn new<P: AsRef<Path>>(root: P, config: &WaterDatasetConfig) -> error::Result<Self> {
        let root = root.as_ref();
        let images = sorted_by_index(&root.join(&config.image_folder))?;
        let masks = sorted_by_index(&root.join(&config.mask_folder))?;

        if images.len() != masks.len() {
            return Err(Error::UnpairedDataset {
                images: images.len(),
                masks: masks.len(),
            });
        }

        if images.is_empty() {
            return Err(Error::EmptyDataset(root.to_path_buf()));
        }

        let items = images
            .iter()
            .zip(masks.iter())
            .map(|(image_path, mask_path)| {
                tracing::debug!("Loading {:?} with mask {:?}", image_path, mask_path);
                load_item(image_path, mask_path, config)
            })
            .collect::<error::Result<Vec<_>>>()?;

        tracing::info!("Loaded {} image/mask pairs from {:?}", items.len(), root);

        Ok(Self::from_items(items))
    }

    pub fn from_items(items: Vec<WaterItem>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Shuffle with `seed` and split off the last `valid_ratio` share as
    /// validation data.
    ///
    /// When the ratio leaves no validation item, both halves cover the whole
    /// dataset.
    pub fn split(self, valid_ratio: f64, seed: u64) -> (WaterSplit, WaterSplit) {
        let len = self.len();
        let shuffled = Arc::new(ShuffledDataset::with_seed(self, seed));

        let valid_len = ((len as f64) * valid_ratio.clamp(0.0, 1.0)).round() as usize;
        let valid_len = valid_len.min(len.saturating_sub(1));

        if valid_len == 0 {
            return (
                PartialDataset::new(shuffled.clone(), 0, len),
                PartialDataset::new(shuffled, 0, len),
            );
        }

        let train_len = len - valid_len;
        (
            PartialDataset::new(shuffled.clone(), 0, train_len),
            PartialDataset::new(shuffled, train_len, len),
        )
    }
}

fn load_item(
    image_path: &Path,
    mask_path: &Path,
    config: &WaterDatasetConfig,
) -> error::Result<WaterItem> {
    let image = image::open(image_path)?;
    let mask = image::open(mask_path)?;

    Ok(WaterItem {
        image: normalize_rgb(&image, config.image_size),
        mask: binarize_mask(&mask, config.image_size, config.mask_threshold),
        size: config.image_size,
    })
}

/// The integer after the last `_` of the file stem, or the whole stem.
pub fn file_index(path: &Path) -> error::Result<u64> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit('_').next())
        .and_then(|key| key.parse().ok())
        .ok_or_else(|| Error::InvalidFileName(path.to_path_buf()))
}

fn sorted_by_index(dir: &Path) -> error::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::MissingDirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));

        if path.is_file() && !hidden {
            files.push((file_index(&path)?, path));
        }
    }

    files.sort_by_key(|(index, _)| *index);
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn write_pair(root: &Path, image_name: &str, mask_name: &str, water: bool) {
        RgbImage::from_pixel(8, 6, Rgb([30, 60, 90]))
            .save(root.join("image").join(image_name))
            .unwrap();
        GrayImage::from_pixel(8, 6, Luma([if water { 255 } else { 0 }]))
            .save(root.join("mask").join(mask_name))
            .unwrap();
    }

    fn dataset_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("image")).unwrap();
        std::fs::create_dir(dir.path().join("mask")).unwrap();
        dir
    }

    fn small_config() -> WaterDatasetConfig {
        WaterDatasetConfig::default().with_image_size([4, 4])
    }

    #[test]
    fn file_index_uses_last_underscore_segment() {
        assert_eq!(file_index(Path::new("a/img_lake_12.jpg")).unwrap(), 12);
        assert_eq!(file_index(Path::new("a/7.png")).unwrap(), 7);
        assert!(matches!(
            file_index(Path::new("a/img_x.png")),
            Err(Error::InvalidFileName(_))
        ));
    }

    #[test]
    fn pairs_are_sorted_numerically() {
        let root = dataset_root();
        write_pair(root.path(), "img_10.png", "mask_10.png", true);
        write_pair(root.path(), "img_2.png", "mask_2.png", false);

        let dataset = WaterDataset::new(root.path(), &small_config()).unwrap();

        assert_eq!(dataset.len(), 2);
        let first = dataset.get(0).unwrap();
        let second = dataset.get(1).unwrap();
        assert!(first.mask.iter().all(|&c| c == 0));
        assert!(second.mask.iter().all(|&c| c == 1));
        assert_eq!(first.image.len(), 3 * 4 * 4);
        assert_eq!(first.size, [4, 4]);
    }

    #[test]
    fn missing_mask_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("image")).unwrap();

        let result = WaterDataset::new(dir.path(), &small_config());

        assert!(matches!(result, Err(Error::MissingDirectory(_))));
    }

    #[test]
    fn unpaired_folders_are_an_error() {
        let root = dataset_root();
        write_pair(root.path(), "1.png", "1.png", true);
        RgbImage::new(8, 6)
            .save(root.path().join("image").join("2.png"))
            .unwrap();

        let result = WaterDataset::new(root.path(), &small_config());

        assert!(matches!(
            result,
            Err(Error::UnpairedDataset { images: 2, masks: 1 })
        ));
    }

    #[test]
    fn empty_folders_are_an_error() {
        let root = dataset_root();

        let result = WaterDataset::new(root.path(), &small_config());

        assert!(matches!(result, Err(Error::EmptyDataset(_))));
    }

    fn items(count: usize) -> Vec<WaterItem> {
        (0..count)
            .map(|i| WaterItem {
                image: vec![i as f32; 3],
                mask: vec![0],
                size: [1, 1],
            })
            .collect()
    }

    #[test]
    fn split_partitions_items() {
        let (train, valid) = WaterDataset::from_items(items(10)).split(0.2, 42);

        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 2);

        let mut seen: Vec<f32> = train
            .iter()
            .chain(valid.iter())
            .map(|item| item.image[0])
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn zero_ratio_validates_on_training_data() {
        let (train, valid) = WaterDataset::from_items(items(5)).split(0.0, 42);

        assert_eq!(train.len(), 5);
        assert_eq!(valid.len(), 5);
    }
}
