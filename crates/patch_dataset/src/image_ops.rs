//! Cropping, padding and patch extraction on RGB images.

use crate::types::{DatasetError, DatasetResult};
use image::imageops::FilterType;
use image::RgbImage;
use rand::Rng;

/// Center-crops or zero-pads `img` to `target_height` x `target_width`.
///
/// Each dimension is handled independently: a larger source is cropped
/// around its center, a smaller one is padded evenly (extra pixel at the
/// bottom/right).
pub fn resize_with_crop_or_pad(
    img: &RgbImage,
    target_height: u32,
    target_width: u32,
) -> DatasetResult<RgbImage> {
    if target_height == 0 || target_width == 0 {
        return Err(DatasetError::InvalidCrop(format!(
            "target size {target_width}x{target_height} must be non-zero"
        )));
    }
    let (width, height) = img.dimensions();

    let offset_crop_width = width.saturating_sub(target_width) / 2;
    let offset_pad_width = target_width.saturating_sub(width) / 2;
    let offset_crop_height = height.saturating_sub(target_height) / 2;
    let offset_pad_height = target_height.saturating_sub(height) / 2;

    let cropped = crop_to_bounding_box(
        img,
        offset_crop_height,
        offset_crop_width,
        target_height.min(height),
        target_width.min(width),
    )?;
    pad_to_bounding_box(
        &cropped,
        offset_pad_height,
        offset_pad_width,
        target_height,
        target_width,
    )
}

pub fn crop_to_bounding_box(
    img: &RgbImage,
    offset_height: u32,
    offset_width: u32,
    target_height: u32,
    target_width: u32,
) -> DatasetResult<RgbImage> {
    let (width, height) = img.dimensions();
    if offset_width + target_width > width || offset_height + target_height > height {
        return Err(DatasetError::InvalidCrop(format!(
            "box {target_width}x{target_height}+{offset_width}+{offset_height} exceeds image {width}x{height}"
        )));
    }
    Ok(image::imageops::crop_imm(img, offset_width, offset_height, target_width, target_height)
        .to_image())
}

pub fn pad_to_bounding_box(
    img: &RgbImage,
    offset_height: u32,
    offset_width: u32,
    target_height: u32,
    target_width: u32,
) -> DatasetResult<RgbImage> {
    let (width, height) = img.dimensions();
    if offset_width + width > target_width || offset_height + height > target_height {
        return Err(DatasetError::InvalidCrop(format!(
            "image {width}x{height} at +{offset_width}+{offset_height} does not fit {target_width}x{target_height}"
        )));
    }
    let mut canvas = RgbImage::new(target_width, target_height);
    image::imageops::replace(&mut canvas, img, offset_width.into(), offset_height.into());
    Ok(canvas)
}

pub(crate) fn resize_stretch(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    image::imageops::resize(img, width, height, FilterType::Triangle)
}

/// Samples `count` patches of `size` (width, height) at uniform positions.
pub fn extract_random_patches(
    img: &RgbImage,
    size: (u32, u32),
    count: usize,
    rng: &mut dyn rand::RngCore,
) -> DatasetResult<Vec<RgbImage>> {
    let (pw, ph) = size;
    let (width, height) = img.dimensions();
    if pw == 0 || ph == 0 || pw > width || ph > height {
        return Err(DatasetError::InvalidCrop(format!(
            "patch {pw}x{ph} does not fit image {width}x{height}"
        )));
    }
    let mut patches = Vec::with_capacity(count);
    for _ in 0..count {
        let x = rng.random_range(0..=width - pw);
        let y = rng.random_range(0..=height - ph);
        patches.push(crop_to_bounding_box(img, y, x, ph, pw)?);
    }
    Ok(patches)
}

/// Converts to CHW floats in [0, 1].
pub fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        chw[base] = pixel[0] as f32 / 255.0;
        chw[plane + base] = pixel[1] as f32 / 255.0;
        chw[2 * plane + base] = pixel[2] as f32 / 255.0;
    }
    chw
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 255]))
    }

    #[test]
    fn crop_or_pad_centers_larger_images() {
        let img = gradient(6, 4);
        let out = resize_with_crop_or_pad(&img, 2, 2).unwrap();
        assert_eq!(out.dimensions(), (2, 2));
        assert_eq!(out.get_pixel(0, 0), &Rgb([2, 1, 255]));
    }

    #[test]
    fn crop_or_pad_zero_fills_smaller_images() {
        let img = gradient(2, 2);
        let out = resize_with_crop_or_pad(&img, 5, 4).unwrap();
        assert_eq!(out.dimensions(), (4, 5));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 1), &Rgb([0, 0, 255]));
        assert_eq!(out.get_pixel(3, 4), &Rgb([0, 0, 0]));
    }

    #[test]
    fn crop_or_pad_mixes_per_axis() {
        let img = gradient(8, 2);
        let out = resize_with_crop_or_pad(&img, 4, 4).unwrap();
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(out.get_pixel(0, 1), &Rgb([2, 0, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn out_of_bounds_boxes_fail() {
        let img = gradient(4, 4);
        assert!(crop_to_bounding_box(&img, 2, 2, 3, 3).is_err());
        assert!(pad_to_bounding_box(&img, 1, 0, 4, 4).is_err());
        assert!(resize_with_crop_or_pad(&img, 0, 4).is_err());
    }

    #[test]
    fn random_patches_stay_inside() {
        let img = gradient(10, 7);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let patches = extract_random_patches(&img, (4, 3), 5, &mut rng).unwrap();
        assert_eq!(patches.len(), 5);
        assert!(patches.iter().all(|p| p.dimensions() == (4, 3)));
        assert!(extract_random_patches(&img, (11, 1), 1, &mut rng).is_err());
    }

    #[test]
    fn chw_layout_splits_channels() {
        let img = RgbImage::from_pixel(2, 1, Rgb([255, 0, 51]));
        let chw = to_chw(&img);
        assert_eq!(chw.len(), 6);
        assert_eq!(&chw[0..2], &[1.0, 1.0]);
        assert_eq!(&chw[2..4], &[0.0, 0.0]);
        assert!((chw[4] - 0.2).abs() < 1e-6);
    }
}
