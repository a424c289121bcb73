//! Batch iteration over labelled image directories.

use crate::aug::{AugmentationConfig, Augmenter};
use crate::image_ops::{resize_stretch, resize_with_crop_or_pad, to_chw};
use crate::scan::index_directory;
use crate::types::{
    DatasetError, DatasetResult, DirectoryIndex, ImageBatch, ImageSample, ResizeMode,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};

pub(crate) const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Bring every image to this (width, height). If None, images in a batch
    /// must already share shape.
    pub target_size: Option<(u32, u32)>,
    /// How to reach `target_size`.
    pub resize_mode: ResizeMode,
    /// Shuffle sample order at the start of every epoch.
    pub shuffle: bool,
    /// Drop the last partial batch.
    pub drop_last: bool,
    pub augmentation: AugmentationConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            target_size: Some((224, 224)),
            resize_mode: ResizeMode::CropOrPad,
            shuffle: true,
            drop_last: false,
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl BatchConfig {
    pub(crate) fn validate(&self) -> DatasetResult<()> {
        if self.batch_size == 0 {
            return Err(DatasetError::InvalidConfig("batch_size must be > 0".into()));
        }
        if let Some((w, h)) = self.target_size {
            if w == 0 || h == 0 {
                return Err(DatasetError::InvalidConfig(format!(
                    "target_size {w}x{h} must be non-zero"
                )));
            }
        }
        Ok(())
    }

    /// Number of batches per epoch over `samples` inputs.
    pub(crate) fn batches_for(&self, samples: usize) -> usize {
        if self.drop_last {
            samples / self.batch_size
        } else {
            samples.div_ceil(self.batch_size)
        }
    }
}

#[cfg(feature = "burn-runtime")]
pub struct BurnBatch<B: burn::tensor::backend::Backend> {
    pub images: burn::tensor::Tensor<B, 4>,
    pub labels: burn::tensor::Tensor<B, 1, burn::tensor::Int>,
}

#[cfg(feature = "burn-runtime")]
impl ImageBatch {
    pub fn to_burn<B: burn::tensor::backend::Backend>(&self, device: &B::Device) -> BurnBatch<B> {
        let n = self.len();
        let images = burn::tensor::Tensor::<B, 1>::from_floats(self.images.as_slice(), device)
            .reshape([n, 3, self.height as usize, self.width as usize]);
        let labels: Vec<i64> = self.labels.iter().map(|&l| l as i64).collect();
        let labels = burn::tensor::Tensor::<B, 1, burn::tensor::Int>::from_data(
            burn::tensor::TensorData::new(labels, [n]),
            device,
        );
        BurnBatch { images, labels }
    }
}

/// Decode, size, augment and stack `samples` in input order.
///
/// `seeds[i]` drives the augmentation of `samples[i]`, so results do not
/// depend on how rayon schedules the decode work.
pub(crate) fn assemble(
    samples: &[&ImageSample],
    seeds: &[u64],
    cfg: &BatchConfig,
    augmenter: &Augmenter,
) -> DatasetResult<ImageBatch> {
    let loaded: Vec<DatasetResult<(Vec<f32>, (u32, u32))>> = samples
        .par_iter()
        .zip(seeds.par_iter())
        .map(|(sample, &seed)| load_image(sample, seed, cfg, augmenter))
        .collect();

    let mut expected: Option<(u32, u32)> = None;
    let mut images = Vec::new();
    for (sample, res) in samples.iter().zip(loaded) {
        let (chw, size) = res?;
        match expected {
            None => {
                expected = Some(size);
                images.reserve(chw.len() * samples.len());
            }
            Some(sz) if sz != size => {
                return Err(DatasetError::ShapeMismatch {
                    path: sample.path.clone(),
                    expected: sz,
                    found: size,
                });
            }
            _ => {}
        }
        images.extend_from_slice(&chw);
    }
    let (width, height) = expected.unwrap_or((0, 0));
    Ok(ImageBatch {
        images,
        labels: samples.iter().map(|s| s.label).collect(),
        names: samples.iter().map(|s| s.name.clone()).collect(),
        width,
        height,
    })
}

fn load_image(
    sample: &ImageSample,
    seed: u64,
    cfg: &BatchConfig,
    augmenter: &Augmenter,
) -> DatasetResult<(Vec<f32>, (u32, u32))> {
    let img = image::open(&sample.path)
        .map_err(|e| DatasetError::Image {
            path: sample.path.clone(),
            source: e,
        })?
        .to_rgb8();
    let img = match (cfg.target_size, cfg.resize_mode) {
        (Some((w, h)), ResizeMode::CropOrPad) => resize_with_crop_or_pad(&img, h, w)?,
        (Some((w, h)), ResizeMode::Stretch) => resize_stretch(&img, w, h),
        (None, _) => img,
    };
    let img = if augmenter.is_noop() {
        img
    } else {
        let mut rng = StdRng::seed_from_u64(seed);
        augmenter.apply(img, &mut rng)
    };
    Ok((to_chw(&img), img.dimensions()))
}

/// Running counters shared by the single and paired iterators.
#[derive(Debug)]
pub(crate) struct Progress {
    label: &'static str,
    started: Instant,
    last_log: Instant,
    processed_samples: usize,
    processed_batches: usize,
    last_logged_samples: usize,
    log_every_samples: Option<usize>,
}

impl Progress {
    pub(crate) fn new(label: &'static str) -> Self {
        let log_every_samples = match std::env::var("PATCH_DATASET_LOG_EVERY") {
            Ok(val) => {
                if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
                    None
                } else {
                    val.trim().parse::<usize>().ok().filter(|v| *v > 0)
                }
            }
            Err(_) => Some(DEFAULT_LOG_EVERY_SAMPLES),
        };
        let now = Instant::now();
        Self {
            label,
            started: now,
            last_log: now,
            processed_samples: 0,
            processed_batches: 0,
            last_logged_samples: 0,
            log_every_samples,
        }
    }

    pub(crate) fn record(&mut self, batch_len: usize) {
        self.processed_samples += batch_len;
        self.processed_batches += 1;
        let Some(threshold) = self.log_every_samples else {
            return;
        };
        let since = self.processed_samples - self.last_logged_samples;
        if since < threshold && self.last_log.elapsed() < Duration::from_secs(30) {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        tracing::debug!(
            iter = self.label,
            batches = self.processed_batches,
            samples = self.processed_samples,
            rate = self.processed_samples as f32 / secs,
            "dataset progress"
        );
        self.last_logged_samples = self.processed_samples;
        self.last_log = Instant::now();
    }
}

/// Iterates `(image, label)` batches over a directory index.
pub struct BatchIter {
    samples: Vec<ImageSample>,
    order: Vec<usize>,
    cursor: usize,
    cfg: BatchConfig,
    augmenter: Augmenter,
    rng: StdRng,
    progress: Progress,
}

impl BatchIter {
    pub fn from_root(
        root: &Path,
        classes: Option<&[String]>,
        cfg: BatchConfig,
        rng: StdRng,
    ) -> DatasetResult<Self> {
        let index = index_directory(root, classes)?;
        Self::new(&index, cfg, rng)
    }

    pub fn new(index: &DirectoryIndex, cfg: BatchConfig, rng: StdRng) -> DatasetResult<Self> {
        Self::from_samples(index.samples.clone(), cfg, rng)
    }

    pub fn from_samples(
        samples: Vec<ImageSample>,
        cfg: BatchConfig,
        rng: StdRng,
    ) -> DatasetResult<Self> {
        cfg.validate()?;
        let augmenter = Augmenter::new(cfg.augmentation.clone());
        tracing::debug!(
            samples = samples.len(),
            batch_size = cfg.batch_size,
            augmentation = %augmenter.describe(),
            "building batch iterator"
        );
        let mut iter = Self {
            order: (0..samples.len()).collect(),
            samples,
            cursor: 0,
            cfg,
            augmenter,
            rng,
            progress: Progress::new("single"),
        };
        iter.reset();
        Ok(iter)
    }

    pub fn len_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn len_batches(&self) -> usize {
        self.cfg.batches_for(self.samples.len())
    }

    /// Starts a new epoch, reshuffling when configured.
    pub fn reset(&mut self) {
        self.cursor = 0;
        if self.cfg.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    pub fn next_batch(&mut self) -> DatasetResult<Option<ImageBatch>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.cfg.batch_size).min(self.order.len());
        if self.cfg.drop_last && end - self.cursor < self.cfg.batch_size {
            self.cursor = self.order.len();
            return Ok(None);
        }
        let picked: Vec<&ImageSample> = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.samples[i])
            .collect();
        self.cursor = end;
        let seeds: Vec<u64> = picked.iter().map(|_| self.rng.next_u64()).collect();
        let batch = assemble(&picked, &seeds, &self.cfg, &self.augmenter)?;
        self.progress.record(batch.len());
        Ok(Some(batch))
    }
}
