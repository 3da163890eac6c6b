use image::{
    DynamicImage,
    imageops::{self, FilterType},
};

/// Channel means of the ImageNet statistics the pretrained backbones expect.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Channel standard deviations of the ImageNet statistics.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize an image to `[height, width]`, scale it to `[0, 1]` and normalize it
/// with the ImageNet statistics.
///
/// The result is laid out channel first (`[3, height, width]`).
pub fn normalize_rgb(image: &DynamicImage, [height, width]: [usize; 2]) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, width as u32, height as u32, FilterType::Triangle);

    let plane = height * width;
    let mut data = vec![0.0; 3 * plane];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            data[c * plane + offset] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    data
}

/// Resize a mask to `[height, width]` and map every pixel to a class index:
/// `1` when its luma is at least `threshold`, `0` otherwise.
pub fn binarize_mask(image: &DynamicImage, [height, width]: [usize; 2], threshold: u8) -> Vec<u8> {
    let luma = image.to_luma8();
    let resized = imageops::resize(&luma, width as u32, height as u32, FilterType::Triangle);

    resized
        .pixels()
        .map(|pixel| u8::from(pixel[0] >= threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn normalize_rgb_is_channel_first() {
        let image = RgbImage::from_pixel(4, 2, Rgb([255, 0, 128]));
        let data = normalize_rgb(&DynamicImage::ImageRgb8(image), [2, 4]);

        assert_eq!(data.len(), 3 * 2 * 4);

        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!(data[..8].iter().all(|v| (v - red).abs() < 1e-5));
        assert!(data[8..16].iter().all(|v| (v - green).abs() < 1e-5));
    }

    #[test]
    fn normalize_rgb_resizes() {
        let image = RgbImage::from_pixel(10, 6, Rgb([10, 20, 30]));
        let data = normalize_rgb(&DynamicImage::ImageRgb8(image), [3, 5]);

        assert_eq!(data.len(), 3 * 3 * 5);
    }

    #[test]
    fn binarize_mask_thresholds_luma() {
        let mut image = GrayImage::new(2, 2);
        image.put_pixel(0, 0, Luma([0]));
        image.put_pixel(1, 0, Luma([127]));
        image.put_pixel(0, 1, Luma([128]));
        image.put_pixel(1, 1, Luma([255]));

        let mask = binarize_mask(&DynamicImage::ImageLuma8(image), [2, 2], 128);

        assert_eq!(mask, vec![0, 0, 1, 1]);
    }
}
