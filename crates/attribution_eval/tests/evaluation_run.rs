//! End-to-end runs over feature files and checkpoints written to a temp dir.

use attribution_eval::features::FeatureFile;
use attribution_eval::{
    load_features, run, Checkpoint, ClassifierKind, EvalConfig, EvalError, EvaluationReport,
};
use patch_fusion::RaggedPolicy;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const LAYER: &str = "avg_pool";

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string(value)?)?;
    Ok(())
}

/// Two recaptures, two paintings each, three patches per painting, one feature.
fn feature_file() -> FeatureFile {
    let mut names = Vec::new();
    let mut labels = Vec::new();
    let mut rows = Vec::new();
    let paintings = [
        ("r1-vg1", 1, [0.2f32, 0.5, 0.1]),
        ("r1-vg2", 1, [0.4, -0.1, 0.3]),
        ("r2-nvg1", 0, [-0.3, -0.6, -0.1]),
        ("r2-nvg2", 0, [-0.2, 0.1, -0.4]),
    ];
    for (painting, label, values) in paintings {
        for (i, v) in values.iter().enumerate() {
            names.push(format!("{painting}-{i}"));
            labels.push(label);
            rows.push(vec![*v]);
        }
    }
    FeatureFile {
        names,
        labels,
        layers: BTreeMap::from([(LAYER.to_string(), rows)]),
    }
}

fn checkpoint(kind: ClassifierKind) -> Checkpoint {
    Checkpoint {
        kind,
        classes: vec!["others".into(), "van_gogh".into()],
        coef: match kind {
            ClassifierKind::NearestCentroid => vec![vec![-1.0], vec![1.0]],
            _ => vec![vec![1.0]],
        },
        intercept: match kind {
            ClassifierKind::NearestCentroid => Vec::new(),
            _ => vec![0.0],
        },
    }
}

fn config(root: &Path, kind: ClassifierKind) -> anyhow::Result<EvalConfig> {
    let data_dir = root.join("features");
    fs::create_dir_all(&data_dir)?;
    write_json(&data_dir.join("test.json"), &feature_file())?;
    let ckpt = root.join("model.json");
    write_json(&ckpt, &checkpoint(kind))?;
    Ok(EvalConfig {
        data_dir,
        ckpt,
        output_dir: root.join("out"),
        layers: vec![LAYER.to_string()],
        ..EvalConfig::default()
    })
}

#[test]
fn margin_model_run_writes_full_report() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), ClassifierKind::LinearSvc)?;
    let report = run(&cfg)?;

    assert_eq!(EvaluationReport::read(&cfg.report_path())?, report);
    assert_eq!(report.entries.len(), 1);
    let entry = &report.entries[0];
    assert_eq!((entry.phase.as_str(), entry.layer.as_str()), ("test", LAYER));
    assert!(entry.error.is_none());
    assert_eq!(entry.samples.len(), 12);

    let groups = entry.groups.as_ref().expect("grouped");
    assert_eq!(groups.names, vec!["r1-vg1", "r1-vg2", "r2-nvg1", "r2-nvg2"]);
    assert_eq!(entry.evaluations[0].strategy, "raw");
    assert_eq!(entry.evaluations[0].score, Some(10.0 / 12.0));

    for strategy in ["sum", "mean", "farthest", "most_frequent"] {
        let eval = entry.evaluation(strategy).expect(strategy);
        assert_eq!(eval.p, vec![1, 1, 0, 0], "{strategy}");
        assert_eq!(eval.score, Some(1.0));
        let recaptures = eval.recaptures.as_ref().expect("recaptures");
        assert_eq!(recaptures.names, vec!["r1", "r2"]);
        assert_eq!(recaptures.p, vec![1, 0]);
        assert_eq!(recaptures.score, 1.0);
    }
    Ok(())
}

#[test]
fn probabilistic_model_fuses_as_multi_class() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cfg = config(tmp.path(), ClassifierKind::LogisticRegression)?;
    cfg.group_recaptures = false;
    let report = run(&cfg)?;
    let entry = &report.entries[0];
    let sum = entry.evaluation("sum").expect("sum");
    assert_eq!(sum.p, vec![1, 1, 0, 0]);
    assert!(sum.recaptures.is_none());
    Ok(())
}

#[test]
fn failing_phase_is_recorded_and_run_continues() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cfg = config(tmp.path(), ClassifierKind::LinearSvc)?;
    let mut train = feature_file();
    train.labels[0] = 0;
    write_json(&cfg.data_dir.join("train.json"), &train)?;
    cfg.phases = vec!["train".to_string(), "test".to_string()];

    let report = run(&cfg)?;
    assert!(cfg.report_path().exists());
    assert_eq!(EvaluationReport::read(&cfg.report_path())?, report);
    assert_eq!(report.entries.len(), 2);

    let failed = &report.entries[0];
    assert_eq!(failed.phase, "train");
    assert!(failed.error.as_deref().unwrap_or("").contains("r1-vg1"));
    assert_eq!(failed.evaluations.len(), 1);
    assert!(failed.evaluations[0].score.is_some());

    let scored = &report.entries[1];
    assert_eq!(scored.phase, "test");
    assert!(scored.error.is_none());
    for strategy in ["sum", "mean", "farthest", "most_frequent"] {
        let eval = scored.evaluation(strategy).expect(strategy);
        assert_eq!(eval.score, Some(1.0), "{strategy}");
        assert!(eval.error.is_none());
    }
    Ok(())
}

#[test]
fn labels_only_model_records_capability_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), ClassifierKind::NearestCentroid)?;
    let report = run(&cfg)?;
    let entry = &report.entries[0];
    assert!(entry.error.as_deref().unwrap_or("").contains("capability"));
    assert_eq!(entry.evaluations.len(), 1);
    assert_eq!(entry.evaluations[0].strategy, "raw");
    Ok(())
}

#[test]
fn limit_patches_caps_patch_axis() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cfg = config(tmp.path(), ClassifierKind::LinearSvc)?;
    cfg.limit_patches = Some(2);
    let report = run(&cfg)?;
    let farthest = report.entries[0].evaluation("farthest").expect("farthest");
    assert_eq!(farthest.patches, Some(2));
    Ok(())
}

#[test]
fn ragged_paintings_follow_policy() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cfg = config(tmp.path(), ClassifierKind::LinearSvc)?;
    let mut file = feature_file();
    file.names.pop();
    file.labels.pop();
    if let Some(rows) = file.layers.get_mut(LAYER) {
        rows.pop();
    }
    write_json(&cfg.data_dir.join("test.json"), &file)?;

    let rejected = run(&cfg)?;
    assert!(rejected.entries[0]
        .error
        .as_deref()
        .unwrap_or("")
        .contains("r2-nvg2"));

    cfg.ragged_policy = RaggedPolicy::Truncate;
    let truncated = run(&cfg)?;
    assert!(truncated.entries[0].error.is_none());
    assert_eq!(
        truncated.entries[0].evaluation("sum").and_then(|e| e.patches),
        Some(2)
    );
    Ok(())
}

#[test]
fn missing_checkpoint_aborts_run() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cfg = config(tmp.path(), ClassifierKind::LinearSvc)?;
    cfg.ckpt = tmp.path().join("absent.json");
    assert!(matches!(run(&cfg), Err(EvalError::Io { .. })));
    assert!(!cfg.report_path().exists());
    Ok(())
}

#[test]
fn chunks_concatenate_and_classes_filter() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let file = feature_file();
    let (first, second) = (
        FeatureFile {
            names: file.names[..6].to_vec(),
            labels: file.labels[..6].to_vec(),
            layers: BTreeMap::from([(LAYER.to_string(), file.layers[LAYER][..6].to_vec())]),
        },
        FeatureFile {
            names: file.names[6..].to_vec(),
            labels: file.labels[6..].to_vec(),
            layers: BTreeMap::from([(LAYER.to_string(), file.layers[LAYER][6..].to_vec())]),
        },
    );
    write_json(&tmp.path().join("test.0.json"), &first)?;
    write_json(&tmp.path().join("test.1.json"), &second)?;

    let phases = vec!["test".to_string()];
    let layers = vec![LAYER.to_string()];
    let all = load_features(tmp.path(), &phases, &layers, None, Some(&[0, 1][..]))?;
    assert_eq!(all["test"].names, file.names);
    assert_eq!(all["test"].layers[LAYER].dim(), (12, 1));

    let van_gogh = load_features(tmp.path(), &phases, &layers, Some(&[1][..]), Some(&[0, 1][..]))?;
    assert_eq!(van_gogh["test"].len(), 6);
    assert!(van_gogh["test"].labels.iter().all(|&l| l == 1));

    let missing = vec!["fc1".to_string()];
    assert!(matches!(
        load_features(tmp.path(), &phases, &missing, None, Some(&[0][..])),
        Err(EvalError::FeatureStore { .. })
    ));
    Ok(())
}

#[test]
fn config_file_overrides_defaults() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("eval.toml");
    fs::write(
        &path,
        r#"
data_dir = "/srv/features"
phases = ["train", "test"]
layer = "fc2"
limit_patches = 8
ragged_policy = "truncate"
group_recaptures = false
"#,
    )?;
    let cfg = EvalConfig::from_path(&path)?;
    assert_eq!(cfg.data_dir, Path::new("/srv/features"));
    assert_eq!(cfg.phases, vec!["train", "test"]);
    assert_eq!(cfg.layers, vec!["fc2"]);
    assert_eq!(cfg.limit_patches, Some(8));
    assert_eq!(cfg.ragged_policy, RaggedPolicy::Truncate);
    assert!(!cfg.group_recaptures);
    assert!(cfg.group_patches);
    assert_eq!(cfg.results_file_name, "report.json");
    Ok(())
}
