//! Evaluation driver: raw patch accuracy, then every fusion strategy at
//! painting and recapture level.

use crate::config::EvalConfig;
use crate::error::{EvalError, EvalResult};
use crate::features::load_features;
use crate::metrics::{accuracy_score, classification_report, ConfusionMatrix};
use crate::model::{Classifier, LinearClassifier, PredictionCapability};
use crate::report::{
    EvaluationReport, GroupSummary, LayerReport, RecaptureEvaluation, StrategyEvaluation,
    RAW_STRATEGY,
};
use ndarray::ArrayView2;
use patch_fusion::{
    fuse_recaptures, group_by_paintings, Fusion, FusionError, FusionInputs, GroupedPatches,
    RaggedPolicy, Strategy,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluateOptions {
    pub group_patches: bool,
    pub group_recaptures: bool,
    pub limit_patches: Option<usize>,
    pub ragged_policy: RaggedPolicy,
}

impl From<&EvalConfig> for EvaluateOptions {
    fn from(cfg: &EvalConfig) -> Self {
        Self {
            group_patches: cfg.group_patches,
            group_recaptures: cfg.group_recaptures,
            limit_patches: cfg.limit_patches,
            ragged_policy: cfg.ragged_policy,
        }
    }
}

/// Evaluates one (phase, layer) pair.
///
/// Failures after the raw evaluation are recorded on the returned entry
/// rather than propagated, so one bad layer does not stop a run.
pub fn evaluate<C: Classifier + ?Sized>(
    model: &C,
    phase: &str,
    layer: &str,
    x: ArrayView2<f32>,
    y: &[usize],
    names: &[String],
    opts: &EvaluateOptions,
) -> LayerReport {
    let mut report = LayerReport::new(phase, layer, names, y);
    if let Err(err) = evaluate_into(&mut report, model, x, y, names, opts) {
        warn!(phase, layer, error = %err, "evaluation failed");
        report.error = Some(err.to_string());
    }
    report
}

fn evaluate_into<C: Classifier + ?Sized>(
    report: &mut LayerReport,
    model: &C,
    x: ArrayView2<f32>,
    y: &[usize],
    names: &[String],
    opts: &EvaluateOptions,
) -> EvalResult<()> {
    info!(
        phase = %report.phase,
        layer = %report.layer,
        samples = x.nrows(),
        features = x.ncols(),
        "evaluating patches"
    );
    let class_names = model.class_names();
    let predicted = model.predict(x)?.to_vec();
    let score = accuracy_score(y, &predicted);
    info!(strategy = RAW_STRATEGY, score, "patch accuracy");
    log_breakdown(RAW_STRATEGY, "patch", &predicted, y, &class_names);
    report
        .evaluations
        .push(StrategyEvaluation::scored(RAW_STRATEGY, score, predicted));

    if !opts.group_patches {
        return Ok(());
    }

    let mut grouped = group_by_paintings(x, y, names, opts.ragged_policy)?;
    if let Some(limit) = opts.limit_patches {
        grouped = grouped.limit_patches(limit);
    }
    info!(
        paintings = grouped.groups(),
        patches = grouped.patches(),
        "grouped patches by painting"
    );
    report.groups = Some(GroupSummary {
        names: grouped.names.clone(),
        labels: grouped.labels.clone(),
    });

    let (inputs, multi_class) = fusion_inputs(model, &grouped)?;
    for strategy in Strategy::ALL {
        let evaluation =
            evaluate_strategy(strategy, multi_class, &inputs, &grouped, &class_names, opts);
        report.evaluations.push(evaluation);
    }
    Ok(())
}

/// Builds fusion inputs from what the model can produce.
fn fusion_inputs<C: Classifier + ?Sized>(
    model: &C,
    grouped: &GroupedPatches,
) -> EvalResult<(FusionInputs, bool)> {
    let (groups, patches) = (grouped.groups(), grouped.patches());
    let flat = grouped.flat_features();
    let reshape_err = |e: ndarray::ShapeError| EvalError::from(FusionError::invalid(e.to_string()));
    match model.capability() {
        PredictionCapability::Probabilistic => {
            let proba = model.predict_proba(flat.view())?;
            let classes = proba.ncols();
            let proba = proba
                .into_shape_with_order((groups, patches, classes))
                .map_err(reshape_err)?;
            Ok((FusionInputs::probabilistic(proba), true))
        }
        PredictionCapability::MarginBased => {
            let labels = model
                .predict(flat.view())?
                .into_shape_with_order((groups, patches))
                .map_err(reshape_err)?;
            let distance = model.decision_function(flat.view())?;
            let columns = distance.ncols();
            let distance = distance
                .into_shape_with_order((groups, patches, columns))
                .map_err(reshape_err)?;
            Ok((
                FusionInputs::margin(labels, distance),
                model.n_classes() > 2,
            ))
        }
        PredictionCapability::LabelsOnly => Err(EvalError::ModelCapability(
            "model offers neither class probabilities nor decision distances".into(),
        )),
    }
}

/// Logs the confusion matrix and per-class report at debug level.
fn log_breakdown(
    strategy: &str,
    level: &str,
    predicted: &[usize],
    truth: &[usize],
    class_names: &[String],
) {
    debug!(
        strategy,
        level,
        "confusion matrix:\n{}",
        ConfusionMatrix::from_predictions(predicted, truth)
    );
    debug!(
        strategy,
        level,
        "classification report:\n{}",
        classification_report(predicted, truth, class_names)
    );
}

/// Names whose fused label differs from the true one.
fn misclassified<'a>(names: &'a [String], predicted: &[usize], truth: &[usize]) -> Vec<&'a str> {
    names
        .iter()
        .zip(predicted.iter().zip(truth))
        .filter(|(_, (p, t))| p != t)
        .map(|(n, _)| n.as_str())
        .collect()
}

fn evaluate_strategy(
    strategy: Strategy,
    multi_class: bool,
    inputs: &FusionInputs,
    grouped: &GroupedPatches,
    class_names: &[String],
    opts: &EvaluateOptions,
) -> StrategyEvaluation {
    let predicted = match Fusion::new(strategy, multi_class).predict(inputs) {
        Ok(p) => p,
        Err(err) => {
            warn!(%strategy, error = %err, "fusion failed");
            return StrategyEvaluation::failed(strategy.as_str(), err.to_string());
        }
    };
    let score = accuracy_score(&grouped.labels, &predicted);
    info!(%strategy, score, "painting accuracy");
    log_breakdown(strategy.as_str(), "painting", &predicted, &grouped.labels, class_names);
    let missed = misclassified(&grouped.names, &predicted, &grouped.labels);
    if !missed.is_empty() {
        info!(%strategy, ?missed, "misclassified paintings");
    }

    let recaptures = if opts.group_recaptures {
        match fuse_recaptures(&grouped.names, &predicted, &grouped.labels) {
            Ok(fused) => {
                let score = accuracy_score(&fused.labels, &fused.predicted);
                info!(%strategy, recaptures = fused.names.len(), score, "recapture accuracy");
                log_breakdown(
                    strategy.as_str(),
                    "recapture",
                    &fused.predicted,
                    &fused.labels,
                    class_names,
                );
                let missed = misclassified(&fused.names, &fused.predicted, &fused.labels);
                if !missed.is_empty() {
                    info!(%strategy, ?missed, "misclassified recaptures");
                }
                Some(RecaptureEvaluation {
                    names: fused.names,
                    labels: fused.labels,
                    p: fused.predicted,
                    score,
                })
            }
            Err(err) => {
                warn!(%strategy, error = %err, "recapture fusion failed");
                return StrategyEvaluation::failed(strategy.as_str(), err.to_string());
            }
        }
    } else {
        None
    };

    let mut evaluation = StrategyEvaluation::scored(strategy.as_str(), score, predicted);
    evaluation.patches = Some(grouped.patches());
    evaluation.recaptures = recaptures;
    evaluation
}

/// Loads the model and features, evaluates every (phase, layer) pair and
/// writes the report to `<output_dir>/<results_file_name>`.
pub fn run(cfg: &EvalConfig) -> EvalResult<EvaluationReport> {
    cfg.validate()?;
    info!(ckpt = %cfg.ckpt.display(), "loading model");
    let model = LinearClassifier::load(&cfg.ckpt)?;
    info!(
        kind = ?model.kind(),
        classes = model.n_classes(),
        capability = ?model.capability(),
        "model loaded"
    );
    run_with_model(&model, cfg)
}

/// Same as [`run`] with an already constructed classifier.
pub fn run_with_model<C: Classifier + ?Sized>(
    model: &C,
    cfg: &EvalConfig,
) -> EvalResult<EvaluationReport> {
    cfg.validate()?;
    let data = load_features(
        &cfg.data_dir,
        &cfg.phases,
        &cfg.layers,
        cfg.classes.as_deref(),
        cfg.chunks.as_deref(),
    )?;
    let opts = EvaluateOptions::from(cfg);
    let mut report = EvaluationReport::default();
    for phase in &cfg.phases {
        let Some(phase_data) = data.get(phase) else {
            return Err(EvalError::FeatureStore {
                path: cfg.data_dir.clone(),
                msg: format!("phase {phase:?} not loaded"),
            });
        };
        for layer in &cfg.layers {
            let Some(x) = phase_data.layers.get(layer) else {
                return Err(EvalError::FeatureStore {
                    path: cfg.data_dir.clone(),
                    msg: format!("layer {layer:?} not loaded for phase {phase:?}"),
                });
            };
            report.entries.push(evaluate(
                model,
                phase,
                layer,
                x.view(),
                &phase_data.labels,
                &phase_data.names,
                &opts,
            ));
        }
    }
    let path = cfg.report_path();
    report.write(&path)?;
    info!(path = %path.display(), entries = report.entries.len(), "report written");
    Ok(report)
}
