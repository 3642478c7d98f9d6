//! trialrun CLI
//!
//! Drives repeated, seed-varied runs of DyGIE++ models into a collision-free
//! output workspace and scores them in one pass.
//!
//! ## Commands
//!
//! - `run`: run models x trials and evaluate the batch
//! - `split`: write a reproducible train/dev/test split of a JSONL dataset
//!
//! ## Exit status
//!
//! 0 on success (including batches where some trials failed), 2 for invalid
//! input or configuration, 3 for a prefix collision, 4 for a missing model,
//! 5 when formatting fails, 6 when evaluation fails, 1 otherwise.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use trialrun_core::{
    init_tracing, parse_alias_override, split_dataset, ModelSpec, SplitConfig, TrialError,
    DEFAULT_MODELS,
};
use trialrun_pipeline::{
    AllennlpRunner, BatchResult, BatchSpec, CommandEvaluator, DygieFormatter, Pipeline,
    TemplateMode,
};

#[derive(Parser)]
#[command(name = "trialrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reproducible multi-model, multi-seed DyGIE++ runs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every requested model for a number of seeded trials
    Run(RunArgs),

    /// Split a JSONL dataset into train/dev/test files
    Split {
        /// JSONL dataset to split
        dataset: PathBuf,

        /// Directory to write the split files into
        out_dir: PathBuf,

        /// Prefix prepended to the split file names
        prefix: String,

        /// Fraction of documents held out for testing
        #[arg(long, default_value_t = 0.1)]
        test_frac: f64,

        /// Fraction of documents held out for development
        #[arg(long, default_value_t = 0.1)]
        dev_frac: f64,

        /// Shuffle seed
        #[arg(long, default_value_t = 1234)]
        random_state: u64,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Workspace root; created with its subdirectories if missing
    root: PathBuf,

    /// Prefix prepended to every output file of this batch
    prefix: String,

    /// Path to the DyGIE++ checkout
    runtime: PathBuf,

    /// Formatted JSONL input, or raw documents with --format-data
    data: PathBuf,

    /// Format raw documents before running
    #[arg(long)]
    format_data: bool,

    /// Gold standard used for evaluation
    #[arg(long, env = "TRIALRUN_GOLD_STANDARD")]
    gold_standard: Option<PathBuf>,

    /// Skip evaluation
    #[arg(long)]
    no_eval: bool,

    /// Models to run
    #[arg(short, long, num_args = 1.., default_values = DEFAULT_MODELS)]
    models: Vec<String>,

    /// Number of seeded trials per model (1 keeps the template's default seeds)
    #[arg(short = 'n', long, default_value_t = 1)]
    num_trials: usize,

    /// Seed template (default: <runtime>/training_config/template.libsonnet)
    #[arg(long, env = "TRIALRUN_SEED_TEMPLATE_PATH")]
    seed_template: Option<PathBuf>,

    /// Patch the shared template in place instead of per-trial copies
    #[arg(long)]
    shared_template: bool,

    /// Concurrent trials per model (per-trial templates only)
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Fixed seed for drawing trial seeds
    #[arg(long)]
    rng_seed: Option<u64>,

    /// Override a model's dataset token (model=token)
    #[arg(long = "dataset-alias")]
    dataset_aliases: Vec<String>,

    /// CUDA device passed to the runner (-1 for CPU)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    cuda_device: i32,

    /// allennlp executable
    #[arg(long, env = "TRIALRUN_ALLENNLP", default_value = "allennlp")]
    allennlp: String,

    /// Python interpreter for the formatting script
    #[arg(long, env = "TRIALRUN_PYTHON", default_value = "python")]
    python: String,

    /// Evaluator command; prediction dir, gold standard and report path are appended
    #[arg(
        long,
        env = "TRIALRUN_EVALUATOR",
        default_value = "python3 evaluate_model_output.py"
    )]
    evaluator: String,
}

impl RunArgs {
    fn to_spec(&self) -> Result<BatchSpec> {
        let mut aliases = BTreeMap::new();
        for raw in &self.dataset_aliases {
            let (model, token) = parse_alias_override(raw)?;
            aliases.insert(model, token);
        }
        let models = self
            .models
            .iter()
            .map(|m| ModelSpec::resolve(m, &aliases))
            .collect();

        let seed_template = match &self.seed_template {
            Some(path) => Some(path.clone()),
            None if self.num_trials > 1 => Some(
                self.runtime
                    .join("training_config")
                    .join("template.libsonnet"),
            ),
            None => None,
        };

        Ok(BatchSpec {
            root: self.root.clone(),
            prefix: self.prefix.clone(),
            runtime: self.runtime.clone(),
            data: self.data.clone(),
            format_data: self.format_data,
            models,
            num_trials: self.num_trials,
            seed_template,
            template_mode: if self.shared_template {
                TemplateMode::Shared
            } else {
                TemplateMode::Isolated
            },
            jobs: self.jobs,
            rng_seed: self.rng_seed,
            evaluate: !self.no_eval,
            gold_standard: self.gold_standard.clone(),
        })
    }

    fn evaluator_command(&self) -> Result<Vec<String>> {
        let command: Vec<String> = self
            .evaluator
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if command.is_empty() {
            anyhow::bail!("evaluator command must not be empty");
        }
        Ok(command)
    }

    fn pipeline(&self) -> Result<Pipeline> {
        let runner = AllennlpRunner {
            runtime: self.runtime.clone(),
            program: self.allennlp.clone(),
            cuda_device: self.cuda_device,
        };
        let formatter = DygieFormatter {
            runtime: self.runtime.clone(),
            python: self.python.clone(),
        };
        let evaluator = CommandEvaluator::new(self.evaluator_command()?);
        Ok(Pipeline::new(
            Arc::new(runner),
            Arc::new(formatter),
            Arc::new(evaluator),
        ))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Split {
            dataset,
            out_dir,
            prefix,
            test_frac,
            dev_frac,
            random_state,
        } => cmd_split(
            &dataset,
            &out_dir,
            &prefix,
            SplitConfig {
                test_frac,
                dev_frac,
                random_state,
            },
        ),
    };

    if let Err(e) = outcome {
        // Same rendering anyhow uses when main returns the error.
        eprintln!("Error: {e:?}");
        std::process::exit(exit_code_for(&e));
    }
}

/// Process exit status for a failed command.
///
/// Runner failures never reach here; they are recorded in the manifest.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<TrialError>() {
        Some(TrialError::InvalidConfig(_))
        | Some(TrialError::MalformedTemplate { .. })
        | Some(TrialError::MalformedInput { .. }) => 2,
        Some(TrialError::NamespaceCollision { .. }) => 3,
        Some(TrialError::ModelNotFound { .. }) => 4,
        Some(TrialError::FormatterFailure { .. }) => 5,
        Some(TrialError::EvaluatorFailure { .. }) => 6,
        _ => 1,
    }
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let spec = args.to_spec()?;
    let pipeline = args.pipeline()?;

    info!(
        root = %spec.root.display(),
        prefix = %spec.prefix,
        models = spec.models.len(),
        trials = spec.num_trials,
        "Starting batch"
    );

    let result = pipeline
        .run(&spec)
        .await
        .with_context(|| format!("batch '{}' did not complete", spec.prefix))?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &BatchResult) {
    println!("Batch ID: {}", result.batch_id);
    println!("Input: {}", result.input.display());
    println!();

    for trial in &result.trials {
        let status = if trial.passed() { "✓" } else { "✗" };
        let seed = trial
            .seeds
            .map(|s| format!("seed {}", s.random_seed))
            .unwrap_or_else(|| "default seeds".to_string());
        println!(
            "  {} {} #{} ({}, {}ms, exit code: {})",
            status,
            trial.model,
            trial.index,
            seed,
            trial.duration_ms,
            trial.exit_code
        );
        if !trial.passed() {
            println!("      log: {}", trial.artifacts.log.display());
        }
    }

    println!();
    println!(
        "Summary: {}/{} trials passed",
        result.passed_count(),
        result.trials.len()
    );
    match &result.evaluation {
        Some(eval) => println!(
            "Report: {} ({} prediction files)",
            eval.report_path.display(),
            eval.selected.len()
        ),
        None => println!("Report: skipped"),
    }
}

fn cmd_split(
    dataset: &Path,
    out_dir: &Path,
    prefix: &str,
    config: SplitConfig,
) -> Result<()> {
    let report = split_dataset(dataset, out_dir, prefix, &config)
        .with_context(|| format!("Failed to split {}", dataset.display()))?;

    println!(
        "Relative lengths of the train, dev, and test sets are {}, {}, {}",
        report.train, report.dev, report.test
    );
    println!("  {}", report.train_path.display());
    println!("  {}", report.dev_path.display());
    println!("  {}", report.test_path.display());
    Ok(())
}
