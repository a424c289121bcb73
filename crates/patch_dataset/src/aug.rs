//! Image augmentation wrapper.

use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Chance of a left/right mirror.
    pub flip_horizontal_prob: f32,
    /// Chance of a top/bottom mirror.
    pub flip_vertical_prob: f32,
    /// Chance of scaling brightness and contrast.
    pub color_jitter_prob: f32,
    /// Both scales are drawn from `1 +/- strength`.
    pub color_jitter_strength: f32,
    /// Chance of per-channel uniform noise.
    pub noise_prob: f32,
    /// Noise amplitude on the 0-1 intensity scale.
    pub noise_strength: f32,
    /// Chance of a gaussian blur.
    pub blur_prob: f32,
    pub blur_sigma: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            flip_horizontal_prob: 0.0,
            flip_vertical_prob: 0.0,
            color_jitter_prob: 0.0,
            color_jitter_strength: 0.1,
            noise_prob: 0.0,
            noise_strength: 0.02,
            blur_prob: 0.0,
            blur_sigma: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Augmenter {
    cfg: AugmentationConfig,
}

impl Augmenter {
    pub fn new(cfg: AugmentationConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.cfg
    }

    pub fn is_noop(&self) -> bool {
        let c = &self.cfg;
        c.flip_horizontal_prob <= 0.0
            && c.flip_vertical_prob <= 0.0
            && (c.color_jitter_prob <= 0.0 || c.color_jitter_strength <= 0.0)
            && (c.noise_prob <= 0.0 || c.noise_strength <= 0.0)
            && (c.blur_prob <= 0.0 || c.blur_sigma <= 0.0)
    }

    pub fn describe(&self) -> String {
        let c = &self.cfg;
        format!(
            "hflip_p={:.2} vflip_p={:.2} color_jitter_p={:.2} strength={:.2} noise_p={:.2} strength={:.3} blur_p={:.2} sigma={:.2}",
            c.flip_horizontal_prob,
            c.flip_vertical_prob,
            c.color_jitter_prob,
            c.color_jitter_strength,
            c.noise_prob,
            c.noise_strength,
            c.blur_prob,
            c.blur_sigma,
        )
    }

    pub fn apply(&self, mut img: RgbImage, rng: &mut dyn rand::RngCore) -> RgbImage {
        let c = &self.cfg;
        maybe_hflip(&mut img, c.flip_horizontal_prob, rng);
        maybe_vflip(&mut img, c.flip_vertical_prob, rng);
        maybe_jitter(&mut img, c.color_jitter_prob, c.color_jitter_strength, rng);
        maybe_noise(&mut img, c.noise_prob, c.noise_strength, rng);
        maybe_blur(&mut img, c.blur_prob, c.blur_sigma, rng);
        img
    }
}

#[derive(Debug, Clone, Default)]
pub struct AugmenterBuilder {
    inner: AugmentationConfig,
}

impl AugmenterBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn flip_horizontal_prob(mut self, p: f32) -> Self {
        self.inner.flip_horizontal_prob = p;
        self
    }
    pub fn flip_vertical_prob(mut self, p: f32) -> Self {
        self.inner.flip_vertical_prob = p;
        self
    }
    pub fn color_jitter(mut self, prob: f32, strength: f32) -> Self {
        self.inner.color_jitter_prob = prob;
        self.inner.color_jitter_strength = strength;
        self
    }
    pub fn noise(mut self, prob: f32, strength: f32) -> Self {
        self.inner.noise_prob = prob;
        self.inner.noise_strength = strength;
        self
    }
    pub fn blur(mut self, prob: f32, sigma: f32) -> Self {
        self.inner.blur_prob = prob;
        self.inner.blur_sigma = sigma;
        self
    }
    pub fn build(self) -> Augmenter {
        Augmenter::new(self.inner)
    }
}

fn fires(prob: f32, rng: &mut dyn rand::RngCore) -> bool {
    prob > 0.0 && rng.random_range(0.0..1.0) < prob
}

pub(crate) fn maybe_hflip(img: &mut RgbImage, prob: f32, rng: &mut dyn rand::RngCore) {
    if fires(prob, rng) {
        image::imageops::flip_horizontal_in_place(img);
    }
}

pub(crate) fn maybe_vflip(img: &mut RgbImage, prob: f32, rng: &mut dyn rand::RngCore) {
    if fires(prob, rng) {
        image::imageops::flip_vertical_in_place(img);
    }
}

pub(crate) fn maybe_jitter(
    img: &mut RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if strength <= 0.0 || !fires(prob, rng) {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            let v = ((v - 0.5) * contrast + 0.5) * bright;
            pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_noise(
    img: &mut RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if strength <= 0.0 || !fires(prob, rng) {
        return;
    }
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let noise = rng.random_range(-strength..strength);
            let v = (pixel[c] as f32 / 255.0 + noise).clamp(0.0, 1.0);
            pixel[c] = (v * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_blur(img: &mut RgbImage, prob: f32, sigma: f32, rng: &mut dyn rand::RngCore) {
    if sigma <= 0.0 || !fires(prob, rng) {
        return;
    }
    *img = image::imageops::blur(&*img, sigma);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;

    #[test]
    fn certain_hflip_mirrors_pixels() {
        let mut img = RgbImage::from_fn(2, 1, |x, _| Rgb([x as u8 * 100, 0, 0]));
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        maybe_hflip(&mut img, 1.0, &mut rng);
        assert_eq!(img.get_pixel(0, 0)[0], 100);
        assert_eq!(img.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn default_augmenter_is_identity() {
        let img = RgbImage::from_fn(3, 3, |x, y| Rgb([x as u8, y as u8, 7]));
        let aug = Augmenter::default();
        assert!(aug.is_noop());
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert_eq!(aug.apply(img.clone(), &mut rng), img);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let img = RgbImage::from_pixel(4, 4, Rgb([128, 128, 128]));
        let aug = AugmenterBuilder::new().noise(1.0, 0.2).build();
        let a = aug.apply(img.clone(), &mut rand::rngs::StdRng::seed_from_u64(9));
        let b = aug.apply(img, &mut rand::rngs::StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        assert!(!aug.is_noop());
    }
}
