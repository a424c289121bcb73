//! Patch-to-painting fusion for painting attribution.
//!
//! This crate provides:
//! - Fusion strategies that reduce per-patch model outputs to one label
//! - A fusion engine handling binary vs. multi-class outputs
//! - Grouping of flat patch arrays by painting and by recapture

pub mod engine;
pub mod error;
pub mod grouping;
pub mod strategies;

pub use engine::{Fusion, FusionInputs};
pub use error::{FusionError, FusionResult};
pub use grouping::{
    fuse_recaptures, group_by_paintings, group_by_recaptures, painting_key, recapture_key,
    GroupIndex, GroupedPatches, RaggedPolicy, RecaptureFusion,
};
pub use strategies::{Decision, Strategy};
