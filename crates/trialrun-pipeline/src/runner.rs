//! Capabilities for the external collaborators: model runner, data
//! formatter and evaluator, with subprocess-backed implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use trialrun_core::{ModelSpec, SeedTriple};

use crate::command::{execute, CommandOutput, CommandSpec};

/// Environment variable carrying the trial's seed template path.
pub const SEED_TEMPLATE_ENV: &str = "TRIALRUN_SEED_TEMPLATE";

/// Everything the model runner needs for one trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInvocation {
    pub model: ModelSpec,

    /// Packaged model archive.
    pub archive: PathBuf,

    /// Formatted JSONL input.
    pub input: PathBuf,

    /// Where the runner must write predictions.
    pub prediction_path: PathBuf,

    /// Seed template patched for this trial, if seeds apply.
    pub template: Option<PathBuf>,

    pub seeds: Option<SeedTriple>,
}

/// Runs a packaged model over formatted input.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Run to completion. `Err` only when the runner could not be started.
    async fn run(&self, invocation: &ModelInvocation) -> std::io::Result<CommandOutput>;
}

/// Converts raw documents into the model's input schema.
#[async_trait]
pub trait DataFormatter: Send + Sync {
    async fn format(&self, raw: &Path, output: &Path) -> std::io::Result<CommandOutput>;
}

/// Scores a directory of prediction files against a gold standard.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        predictions_dir: &Path,
        gold_standard: &Path,
        report_path: &Path,
    ) -> std::io::Result<CommandOutput>;
}

/// `allennlp predict` inside a DyGIE++ checkout.
#[derive(Debug, Clone)]
pub struct AllennlpRunner {
    pub runtime: PathBuf,
    pub program: String,
    pub cuda_device: i32,
}

impl AllennlpRunner {
    pub fn new(runtime: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            program: "allennlp".to_string(),
            cuda_device: -1,
        }
    }

    /// Build the predict command for one invocation.
    pub fn command_for(&self, invocation: &ModelInvocation) -> CommandSpec {
        let mut command = vec![
            self.program.clone(),
            "predict".to_string(),
            invocation.archive.to_string_lossy().into_owned(),
            invocation.input.to_string_lossy().into_owned(),
            "--predictor".to_string(),
            "dygie".to_string(),
            "--include-package".to_string(),
            "dygie".to_string(),
            "--use-dataset-reader".to_string(),
            "--output-file".to_string(),
            invocation.prediction_path.to_string_lossy().into_owned(),
            "--cuda-device".to_string(),
            self.cuda_device.to_string(),
            "--silent".to_string(),
        ];
        if let Some(seeds) = &invocation.seeds {
            command.push("--overrides".to_string());
            command.push(
                json!({
                    "random_seed": seeds.random_seed,
                    "numpy_seed": seeds.numpy_seed,
                    "pytorch_seed": seeds.pytorch_seed,
                })
                .to_string(),
            );
        }

        let mut spec = CommandSpec::new(format!("predict:{}", invocation.model.name), command)
            .current_dir(&self.runtime);
        if let Some(template) = &invocation.template {
            spec = spec.env(SEED_TEMPLATE_ENV, template.to_string_lossy());
        }
        spec
    }
}

#[async_trait]
impl ModelRunner for AllennlpRunner {
    async fn run(&self, invocation: &ModelInvocation) -> std::io::Result<CommandOutput> {
        execute(&self.command_for(invocation)).await
    }
}

/// DyGIE++'s `format_new_dataset.py` script.
#[derive(Debug, Clone)]
pub struct DygieFormatter {
    pub runtime: PathBuf,
    pub python: String,
}

impl DygieFormatter {
    pub fn new(runtime: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            python: "python".to_string(),
        }
    }

    pub fn command_for(&self, raw: &Path, output: &Path) -> CommandSpec {
        let script = self
            .runtime
            .join("scripts")
            .join("new-dataset")
            .join("format_new_dataset.py");
        CommandSpec::new(
            "format_data",
            vec![
                self.python.clone(),
                script.to_string_lossy().into_owned(),
                raw.to_string_lossy().into_owned(),
                output.to_string_lossy().into_owned(),
                "scierc".to_string(),
                "--use-scispacy".to_string(),
            ],
        )
    }
}

#[async_trait]
impl DataFormatter for DygieFormatter {
    async fn format(&self, raw: &Path, output: &Path) -> std::io::Result<CommandOutput> {
        execute(&self.command_for(raw, output)).await
    }
}

/// An evaluator invoked as `<command...> <predictions_dir> <gold> <report>`.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    pub command: Vec<String>,
}

impl CommandEvaluator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command_for(
        &self,
        predictions_dir: &Path,
        gold_standard: &Path,
        report_path: &Path,
    ) -> CommandSpec {
        let mut command = self.command.clone();
        command.extend([
            predictions_dir.to_string_lossy().into_owned(),
            gold_standard.to_string_lossy().into_owned(),
            report_path.to_string_lossy().into_owned(),
        ]);
        CommandSpec::new("evaluate", command)
    }
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    async fn evaluate(
        &self,
        predictions_dir: &Path,
        gold_standard: &Path,
        report_path: &Path,
    ) -> std::io::Result<CommandOutput> {
        execute(&self.command_for(predictions_dir, gold_standard, report_path)).await
    }
}
