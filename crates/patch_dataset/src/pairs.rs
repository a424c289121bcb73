//! Image-pair batches for siamese training.

use crate::aug::Augmenter;
use crate::batch::{assemble, BatchConfig, Progress};
use crate::types::{DatasetResult, DirectoryIndex, ImageSample, PairBatch};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::RngCore;

/// Yields balanced pairs: every anchor alternates between a same-class
/// partner (label 1) and a different-class partner (label 0).
///
/// With a single class only same-class pairs can be formed.
pub struct PairBatchIter {
    samples: Vec<ImageSample>,
    by_class: Vec<Vec<usize>>,
    order: Vec<usize>,
    cursor: usize,
    emitted: usize,
    cfg: BatchConfig,
    augmenter: Augmenter,
    rng: StdRng,
    progress: Progress,
}

impl PairBatchIter {
    pub fn new(index: &DirectoryIndex, cfg: BatchConfig, rng: StdRng) -> DatasetResult<Self> {
        cfg.validate()?;
        let samples = index.samples.clone();
        let mut by_class = vec![Vec::new(); index.classes.len()];
        for (i, s) in samples.iter().enumerate() {
            if s.label >= by_class.len() {
                by_class.resize(s.label + 1, Vec::new());
            }
            by_class[s.label].push(i);
        }
        let augmenter = Augmenter::new(cfg.augmentation.clone());
        let mut iter = Self {
            order: (0..samples.len()).collect(),
            samples,
            by_class,
            cursor: 0,
            emitted: 0,
            cfg,
            augmenter,
            rng,
            progress: Progress::new("pairs"),
        };
        iter.reset();
        Ok(iter)
    }

    pub fn len_batches(&self) -> usize {
        self.cfg.batches_for(self.samples.len())
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.emitted = 0;
        if self.cfg.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    fn partner(&mut self, anchor: usize, want_same: bool) -> usize {
        let label = self.samples[anchor].label;
        let other_classes: Vec<usize> = (0..self.by_class.len())
            .filter(|&c| c != label && !self.by_class[c].is_empty())
            .collect();
        if want_same || other_classes.is_empty() {
            let same: Vec<usize> = self.by_class[label]
                .iter()
                .copied()
                .filter(|&i| i != anchor)
                .collect();
            return same.choose(&mut self.rng).copied().unwrap_or(anchor);
        }
        let class = other_classes
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(label);
        self.by_class[class]
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(anchor)
    }

    pub fn next_batch(&mut self) -> DatasetResult<Option<PairBatch>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.cfg.batch_size).min(self.order.len());
        if self.cfg.drop_last && end - self.cursor < self.cfg.batch_size {
            self.cursor = self.order.len();
            return Ok(None);
        }
        let anchors: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let mut partners = Vec::with_capacity(anchors.len());
        for &anchor in &anchors {
            let want_same = self.emitted % 2 == 0;
            self.emitted += 1;
            partners.push(self.partner(anchor, want_same));
        }

        let left: Vec<&ImageSample> = anchors.iter().map(|&i| &self.samples[i]).collect();
        let right: Vec<&ImageSample> = partners.iter().map(|&i| &self.samples[i]).collect();
        let labels = left
            .iter()
            .zip(&right)
            .map(|(a, b)| usize::from(a.label == b.label))
            .collect();

        let left_seeds: Vec<u64> = left.iter().map(|_| self.rng.next_u64()).collect();
        let right_seeds: Vec<u64> = right.iter().map(|_| self.rng.next_u64()).collect();
        let left = assemble(&left, &left_seeds, &self.cfg, &self.augmenter)?;
        let right = assemble(&right, &right_seeds, &self.cfg, &self.augmenter)?;
        self.progress.record(left.len());
        Ok(Some(PairBatch {
            left,
            right,
            labels,
        }))
    }
}
