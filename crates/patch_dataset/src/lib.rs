//! Directory-tree image loading and batching for painting attribution.
//!
//! This crate provides utilities for:
//! - Indexing `root/<class>/<image>` trees into labelled samples
//! - Center crop-or-pad, bounding-box crops/pads and random patches
//! - A small augmentation wrapper (flips, jitter, noise, blur)
//! - Single-image and image-pair batch iteration with seeded shuffling

// Module declarations
pub mod aug;
pub mod batch;
pub mod image_ops;
pub mod pairs;
pub mod scan;
pub mod types;

// Re-export public API
pub use aug::{AugmentationConfig, Augmenter, AugmenterBuilder};
pub use batch::{BatchConfig, BatchIter};
pub use image_ops::{
    crop_to_bounding_box, extract_random_patches, pad_to_bounding_box, resize_with_crop_or_pad,
};
pub use pairs::PairBatchIter;
pub use scan::index_directory;
pub use types::*;

#[cfg(feature = "burn-runtime")]
pub use batch::BurnBatch;
