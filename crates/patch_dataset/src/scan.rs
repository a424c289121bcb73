//! Indexing `root/<class>/<image>` directory trees.

use crate::types::{ClassIndex, DatasetError, DatasetResult, DirectoryIndex, ImageSample};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_dir_sorted(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Scan `root` for class subdirectories and index their images.
///
/// Class ids follow `classes` when given, otherwise the sorted directory
/// names. Files inside each class are visited in sorted order.
pub fn index_directory(root: &Path, classes: Option<&[String]>) -> DatasetResult<DirectoryIndex> {
    let class_names: Vec<String> = match classes {
        Some(list) => {
            for class in list {
                if !root.join(class).is_dir() {
                    return Err(DatasetError::UnknownClass {
                        root: root.to_path_buf(),
                        class: class.clone(),
                    });
                }
            }
            list.to_vec()
        }
        None => read_dir_sorted(root)?
            .into_iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect(),
    };
    let class_index = ClassIndex::new(class_names);

    let mut samples = Vec::new();
    for (label, class) in class_index.names().iter().enumerate() {
        for path in read_dir_sorted(&root.join(class))? {
            if !path.is_file() || !is_image(&path) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            samples.push(ImageSample {
                name: format!("{class}/{stem}"),
                path,
                label,
            });
        }
    }
    if samples.is_empty() {
        return Err(DatasetError::EmptyDataset {
            root: root.to_path_buf(),
        });
    }
    tracing::debug!(
        root = %root.display(),
        classes = class_index.len(),
        samples = samples.len(),
        "indexed image directory"
    );
    Ok(DirectoryIndex {
        root: root.to_path_buf(),
        classes: class_index,
        samples,
    })
}
