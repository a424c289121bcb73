//! Core types, error definitions, and data structures for patch_dataset.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no images found under {root}")]
    EmptyDataset { root: PathBuf },
    #[error("class {class:?} has no directory under {root}")]
    UnknownClass { root: PathBuf, class: String },
    #[error("invalid crop/pad: {0}")]
    InvalidCrop(String),
    #[error("batch contains varying image sizes: {path} is {found:?}, expected {expected:?}; set a target_size to force consistency")]
    ShapeMismatch {
        path: PathBuf,
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Center-crop larger dimensions and zero-pad smaller ones.
    #[default]
    CropOrPad,
    /// Stretch to fill the target dimensions.
    Stretch,
}

/// One image file and its class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
    /// `<class>/<file stem>`
    pub name: String,
}

/// Ordered mapping from class name to class id, built once per index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassIndex {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl ClassIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = ClassIndex::default();
        for name in names {
            let name = name.into();
            if index.lookup.contains_key(&name) {
                continue;
            }
            index.lookup.insert(name.clone(), index.names.len());
            index.names.push(name);
        }
        index
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    pub root: PathBuf,
    pub classes: ClassIndex,
    pub samples: Vec<ImageSample>,
}

/// A batch of images in NCHW layout, normalized to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub images: Vec<f32>,
    pub labels: Vec<usize>,
    pub names: Vec<String>,
    pub width: u32,
    pub height: u32,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// CHW pixels of the `i`-th image.
    pub fn image(&self, i: usize) -> &[f32] {
        let stride = 3 * self.width as usize * self.height as usize;
        &self.images[i * stride..(i + 1) * stride]
    }
}

/// Paired images; `labels[i]` is 1 when both sides share a class, else 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PairBatch {
    pub left: ImageBatch,
    pub right: ImageBatch,
    pub labels: Vec<usize>,
}

impl PairBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
