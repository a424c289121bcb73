//! Evaluation report written at the end of a run.

use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Tag recorded for the per-patch evaluation that precedes fusion.
pub const RAW_STRATEGY: &str = "raw";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecaptureEvaluation {
    pub names: Vec<String>,
    pub labels: Vec<usize>,
    pub p: Vec<usize>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvaluation {
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub p: Vec<usize>,
    /// Patches per painting after grouping and limiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patches: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recaptures: Option<RecaptureEvaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StrategyEvaluation {
    pub fn scored(strategy: impl Into<String>, score: f64, p: Vec<usize>) -> Self {
        Self {
            strategy: strategy.into(),
            score: Some(score),
            p,
            patches: None,
            recaptures: None,
            error: None,
        }
    }

    pub fn failed(strategy: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            score: None,
            p: Vec::new(),
            patches: None,
            recaptures: None,
            error: Some(error.into()),
        }
    }
}

/// Painting names and true labels after grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub names: Vec<String>,
    pub labels: Vec<usize>,
}

/// Everything evaluated for one (phase, layer) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerReport {
    pub phase: String,
    pub layer: String,
    pub samples: Vec<String>,
    pub labels: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<GroupSummary>,
    #[serde(default)]
    pub evaluations: Vec<StrategyEvaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LayerReport {
    pub fn new(phase: &str, layer: &str, samples: &[String], labels: &[usize]) -> Self {
        Self {
            phase: phase.to_string(),
            layer: layer.to_string(),
            samples: samples.to_vec(),
            labels: labels.to_vec(),
            groups: None,
            evaluations: Vec::new(),
            error: None,
        }
    }

    pub fn evaluation(&self, strategy: &str) -> Option<&StrategyEvaluation> {
        self.evaluations.iter().find(|e| e.strategy == strategy)
    }
}

/// Serialized as a bare JSON array of [`LayerReport`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationReport {
    pub entries: Vec<LayerReport>,
}

impl EvaluationReport {
    pub fn write(&self, path: &Path) -> EvalResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
        let file = fs::File::create(path).map_err(|e| EvalError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| EvalError::json(path, e))?;
        writer.flush().map_err(|e| EvalError::io(path, e))
    }

    pub fn read(path: &Path) -> EvalResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| EvalError::json(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> EvaluationReport {
        let names = vec!["r1-a-0".to_string(), "r1-a-1".to_string()];
        let mut entry = LayerReport::new("test", "avg_pool", &names, &[1, 1]);
        entry
            .evaluations
            .push(StrategyEvaluation::scored(RAW_STRATEGY, 0.5, vec![1, 0]));
        entry.groups = Some(GroupSummary {
            names: vec!["r1-a".into()],
            labels: vec![1],
        });
        let mut sum = StrategyEvaluation::scored("sum", 1.0, vec![1]);
        sum.patches = Some(2);
        sum.recaptures = Some(RecaptureEvaluation {
            names: vec!["r1".into()],
            labels: vec![1],
            p: vec![1],
            score: 1.0,
        });
        entry.evaluations.push(sum);
        entry
            .evaluations
            .push(StrategyEvaluation::failed("farthest", "no model outputs supplied"));
        EvaluationReport {
            entries: vec![entry],
        }
    }

    #[test]
    fn report_is_a_json_array_without_empty_optionals() {
        let json = serde_json::to_value(sample_report()).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].get("error").is_none());
        let raw = &entries[0]["evaluations"][0];
        assert_eq!(raw["strategy"], "raw");
        assert!(raw.get("recaptures").is_none());
        let failed = &entries[0]["evaluations"][2];
        assert!(failed.get("score").is_none());
        assert_eq!(failed["error"], "no model outputs supplied");
    }

    #[test]
    fn written_report_reads_back_identically() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("nested").join("report.json");
        let report = sample_report();
        report.write(&path)?;
        assert_eq!(EvaluationReport::read(&path)?, report);
        Ok(())
    }
}
