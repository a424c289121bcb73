//! Run configuration loaded from TOML.
//!
//! Every option is optional in the file; missing ones fall back to the
//! defaults of the Van Gogh recapture experiment. Paths expand a leading `~`
//! and `${VAR}` references.

use crate::error::{EvalError, EvalResult};
use patch_fusion::RaggedPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_CONFIG_NAME: &str = "attribution-eval.toml";
pub const CONFIG_ENV: &str = "EVAL_CONFIG";

const DEFAULT_DATA_DIR: &str =
    "/datasets/vangogh-test-recaptures/recaptures-google-vangogh2016/original/patches/random/";
const DEFAULT_CKPT: &str = "/work/vangogh/wlogs/train-top-svm/2/model.json";
const DEFAULT_LAYER: &str = "global_average_pooling2d_1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalConfig {
    pub data_dir: PathBuf,
    pub ckpt: PathBuf,
    pub output_dir: PathBuf,
    pub results_file_name: String,
    pub group_patches: bool,
    pub group_recaptures: bool,
    pub phases: Vec<String>,
    /// Label ids to keep; all when `None`.
    pub classes: Option<Vec<usize>>,
    pub layers: Vec<String>,
    pub limit_patches: Option<usize>,
    pub chunks: Option<Vec<usize>>,
    pub ragged_policy: RaggedPolicy,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            ckpt: PathBuf::from(DEFAULT_CKPT),
            output_dir: PathBuf::from("."),
            results_file_name: "report.json".to_string(),
            group_patches: true,
            group_recaptures: true,
            phases: vec!["test".to_string()],
            classes: None,
            layers: vec![DEFAULT_LAYER.to_string()],
            limit_patches: None,
            chunks: None,
            ragged_policy: RaggedPolicy::Reject,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EvalConfigFile {
    data_dir: Option<String>,
    ckpt: Option<String>,
    output_dir: Option<String>,
    results_file_name: Option<String>,
    group_patches: Option<bool>,
    group_recaptures: Option<bool>,
    phases: Option<Vec<String>>,
    classes: Option<Vec<usize>>,
    layer: Option<String>,
    layers: Option<Vec<String>>,
    limit_patches: Option<usize>,
    chunks: Option<Vec<usize>>,
    ragged_policy: Option<RaggedPolicy>,
}

impl EvalConfig {
    /// Reads `$EVAL_CONFIG` if set, otherwise `attribution-eval.toml` in the
    /// working directory when present, otherwise the defaults.
    pub fn load() -> EvalResult<Self> {
        let cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_path(&expand_path(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_NAME).exists() => {
                Self::from_path(Path::new(DEFAULT_CONFIG_NAME))?
            }
            Err(_) => Self::default(),
        };
        cfg.warn_if_unusual();
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> EvalResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_toml(&raw)
            .map_err(|e| EvalError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(raw: &str) -> EvalResult<Self> {
        let file: EvalConfigFile =
            toml::from_str(raw).map_err(|e| EvalError::Config(e.to_string()))?;
        Self::from_file(file)
    }

    fn from_file(file: EvalConfigFile) -> EvalResult<Self> {
        let defaults = Self::default();
        let layers = match (file.layer, file.layers) {
            (Some(_), Some(_)) => {
                return Err(EvalError::Config(
                    "set either `layer` or `layers`, not both".into(),
                ))
            }
            (Some(layer), None) => vec![layer],
            (None, Some(layers)) => layers,
            (None, None) => defaults.layers,
        };
        let cfg = EvalConfig {
            data_dir: file
                .data_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.data_dir),
            ckpt: file.ckpt.map(|v| expand_path(&v)).unwrap_or(defaults.ckpt),
            output_dir: file
                .output_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.output_dir),
            results_file_name: file
                .results_file_name
                .unwrap_or(defaults.results_file_name),
            group_patches: file.group_patches.unwrap_or(defaults.group_patches),
            group_recaptures: file.group_recaptures.unwrap_or(defaults.group_recaptures),
            phases: file.phases.unwrap_or(defaults.phases),
            classes: file.classes,
            layers,
            limit_patches: file.limit_patches,
            chunks: file.chunks,
            ragged_policy: file.ragged_policy.unwrap_or_default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EvalResult<()> {
        if self.phases.is_empty() {
            return Err(EvalError::Config("phases must not be empty".into()));
        }
        if self.layers.is_empty() {
            return Err(EvalError::Config("layers must not be empty".into()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if self.layers[..i].contains(layer) {
                return Err(EvalError::Config(format!("layer {layer:?} listed twice")));
            }
        }
        if self.results_file_name.trim().is_empty() {
            return Err(EvalError::Config("results_file_name must not be empty".into()));
        }
        if self.limit_patches == Some(0) {
            return Err(EvalError::Config("limit_patches must be > 0".into()));
        }
        if self.chunks.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(EvalError::Config("chunks must not be empty when set".into()));
        }
        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.results_file_name)
    }

    fn warn_if_unusual(&self) {
        if !self.group_patches && self.group_recaptures {
            warn!("group_recaptures has no effect without group_patches");
        }
        if !self.data_dir.exists() {
            warn!(data_dir = %self.data_dir.display(), "data_dir does not exist");
        }
    }
}

pub(crate) fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(rest) = raw.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{rest}");
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Replaces `${VAR}` with its value; unknown variables are left as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = EvalConfig::from_toml("").unwrap();
        assert_eq!(cfg, EvalConfig::default());
        assert_eq!(cfg.layers, vec!["global_average_pooling2d_1"]);
        assert_eq!(cfg.report_path(), PathBuf::from("./report.json"));
    }

    #[test]
    fn layer_and_layers_are_exclusive() {
        assert!(EvalConfig::from_toml("layer = \"a\"\nlayers = [\"b\"]").is_err());
        let cfg = EvalConfig::from_toml("layers = [\"a\", \"b\"]").unwrap();
        assert_eq!(cfg.layers, vec!["a", "b"]);
    }

    #[test]
    fn unknown_options_are_rejected() {
        assert!(matches!(
            EvalConfig::from_toml("learning_rate = 0.1"),
            Err(EvalError::Config(_))
        ));
    }

    #[test]
    fn env_references_expand() {
        std::env::set_var("ATTRIBUTION_EVAL_TEST_ROOT", "/srv/data");
        assert_eq!(
            expand_env("${ATTRIBUTION_EVAL_TEST_ROOT}/patches/${NOT_SET_ANYWHERE_42}"),
            "/srv/data/patches/${NOT_SET_ANYWHERE_42}"
        );
        assert_eq!(expand_env("plain/${unterminated"), "plain/${unterminated");
    }
}
