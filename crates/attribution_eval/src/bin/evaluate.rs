use anyhow::Context;
use attribution_eval::{run, EvalConfig};
use clap::Parser;
use patch_fusion::RaggedPolicy;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate a painting classifier on patch features with patch fusion strategies"
)]
struct Args {
    /// TOML config; falls back to $EVAL_CONFIG, then ./attribution-eval.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding `<phase>.json` feature files.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Classifier checkpoint (JSON).
    #[arg(long)]
    ckpt: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    results_file_name: Option<String>,
    #[arg(long)]
    group_patches: Option<bool>,
    #[arg(long)]
    group_recaptures: Option<bool>,
    /// Phases to evaluate (repeatable).
    #[arg(long = "phase")]
    phases: Vec<String>,
    /// Label ids to keep (repeatable).
    #[arg(long = "class")]
    classes: Vec<usize>,
    /// Feature layers to evaluate (repeatable).
    #[arg(long = "layer")]
    layers: Vec<String>,
    /// Keep at most this many patches per painting.
    #[arg(long)]
    limit_patches: Option<usize>,
    /// Feature file chunks to concatenate (repeatable).
    #[arg(long = "chunk")]
    chunks: Vec<usize>,
    /// `reject` or `truncate`.
    #[arg(long)]
    ragged_policy: Option<RaggedPolicy>,
}

impl Args {
    fn apply(self, cfg: &mut EvalConfig) {
        if let Some(v) = self.data_dir {
            cfg.data_dir = v;
        }
        if let Some(v) = self.ckpt {
            cfg.ckpt = v;
        }
        if let Some(v) = self.output_dir {
            cfg.output_dir = v;
        }
        if let Some(v) = self.results_file_name {
            cfg.results_file_name = v;
        }
        if let Some(v) = self.group_patches {
            cfg.group_patches = v;
        }
        if let Some(v) = self.group_recaptures {
            cfg.group_recaptures = v;
        }
        if !self.phases.is_empty() {
            cfg.phases = self.phases;
        }
        if !self.classes.is_empty() {
            cfg.classes = Some(self.classes);
        }
        if !self.layers.is_empty() {
            cfg.layers = self.layers;
        }
        if self.limit_patches.is_some() {
            cfg.limit_patches = self.limit_patches;
        }
        if !self.chunks.is_empty() {
            cfg.chunks = Some(self.chunks);
        }
        if let Some(v) = self.ragged_policy {
            cfg.ragged_policy = v;
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attribution_eval=info,evaluate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = Args::parse();
    let mut cfg = match args.config.take() {
        Some(path) => EvalConfig::from_path(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EvalConfig::load().context("loading config")?,
    };
    args.apply(&mut cfg);

    let report = run(&cfg).context("evaluation run failed")?;
    for entry in &report.entries {
        for eval in &entry.evaluations {
            match (eval.score, &eval.error) {
                (Some(score), _) => info!(
                    phase = %entry.phase,
                    layer = %entry.layer,
                    strategy = %eval.strategy,
                    score,
                    recapture_score = eval.recaptures.as_ref().map(|r| r.score),
                    "result"
                ),
                (None, err) => info!(
                    phase = %entry.phase,
                    layer = %entry.layer,
                    strategy = %eval.strategy,
                    error = err.as_deref().unwrap_or("unknown"),
                    "failed"
                ),
            }
        }
        if let Some(err) = &entry.error {
            info!(phase = %entry.phase, layer = %entry.layer, error = %err, "layer failed");
        }
    }
    println!("{}", cfg.report_path().display());
    Ok(())
}
