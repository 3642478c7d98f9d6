//! Batch orchestration: pre-flight checks, per-model trial fan-out and evaluation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};
use trialrun_core::{
    check_models_available, check_prefix_unused, ensure_workspace, input_base_name,
    rewrite_dataset_field, telemetry, ModelLocations, Result, SeedTriple, TrialError, Workspace,
};
use uuid::Uuid;

use crate::dispatch::{run_trial, Trial, TrialContext, TrialOutcome};
use crate::evaluate::{aggregate, EvaluationSummary};
use crate::runner::{DataFormatter, Evaluator, ModelRunner};
use crate::spec::BatchSpec;

/// Result of a complete batch, also persisted as the batch manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,

    pub prefix: String,

    /// Digest of the batch specification.
    pub spec_digest: String,

    /// Formatted input every model ran against.
    pub input: PathBuf,

    /// Outcomes grouped by model in request order, then by trial index.
    pub trials: Vec<TrialOutcome>,

    pub evaluation: Option<EvaluationSummary>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn passed_count(&self) -> usize {
        self.trials.iter().filter(|t| t.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.trials.iter().filter(|t| !t.passed()).count()
    }
}

/// Batch orchestrator over the three external collaborators.
pub struct Pipeline {
    runner: Arc<dyn ModelRunner>,
    formatter: Arc<dyn DataFormatter>,
    evaluator: Arc<dyn Evaluator>,
}

impl Pipeline {
    pub fn new(
        runner: Arc<dyn ModelRunner>,
        formatter: Arc<dyn DataFormatter>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            runner,
            formatter,
            evaluator,
        }
    }

    /// Execute a batch.
    ///
    /// Pre-flight failures (invalid spec, prefix collision, missing model)
    /// return before any runner is invoked. Individual runner failures are
    /// recorded in the result and never abort the batch. An evaluation
    /// failure is returned after the manifest has been written.
    pub async fn run(&self, spec: &BatchSpec) -> Result<BatchResult> {
        let span = telemetry::batch_span(&spec.prefix);
        self.run_batch(spec).instrument(span).await
    }

    async fn run_batch(&self, spec: &BatchSpec) -> Result<BatchResult> {
        let started_at = Utc::now();
        spec.validate()?;
        let spec_digest = spec.digest()?;

        let (workspace, existed) = ensure_workspace(&spec.root)?;
        if existed {
            check_prefix_unused(workspace.root(), &spec.prefix)?;
        }
        let models = check_models_available(
            &spec.models,
            &ModelLocations::under_runtime(&spec.runtime),
        )?;

        let batch_id = Uuid::new_v4();
        info!(
            event = "batch.started",
            batch_id = %batch_id,
            models = models.len(),
            trials_per_model = spec.num_trials,
            spec_digest = %spec_digest,
        );

        let input = self.prepare_input(spec, &workspace).await?;
        let base_name = input_base_name(&input);

        let mut rng = match spec.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut trials = Vec::with_capacity(models.len() * spec.num_trials);
        for model in &models {
            let records = rewrite_dataset_field(&input, &model.spec.dataset)?;
            info!(
                event = "model.started",
                model = %model.spec.name,
                dataset = %model.spec.dataset,
                records = records,
            );

            let planned: Vec<Trial> = if spec.seeded() {
                SeedTriple::generate_distinct(&mut rng, spec.num_trials)?
                    .into_iter()
                    .enumerate()
                    .map(|(index, seeds)| Trial {
                        index,
                        seeds: Some(seeds),
                    })
                    .collect()
            } else {
                vec![Trial {
                    index: 0,
                    seeds: None,
                }]
            };

            let ctx = TrialContext {
                workspace: &workspace,
                model,
                input: &input,
                base_name: &base_name,
                template: spec.seed_template.as_deref(),
                template_mode: spec.template_mode,
            };
            let runner = self.runner.as_ref();
            let ctx = &ctx;
            let mut outcomes: Vec<TrialOutcome> = stream::iter(planned)
                .map(move |trial| run_trial(runner, ctx, trial))
                .buffer_unordered(spec.jobs)
                .try_collect()
                .await?;
            outcomes.sort_by_key(|o| o.index);
            trials.extend(outcomes);
        }

        let evaluated = match (spec.evaluate, &spec.gold_standard) {
            (true, Some(gold)) => aggregate(
                self.evaluator.as_ref(),
                &workspace.predictions_dir(),
                gold,
                &spec.prefix,
                &workspace.report_path(&spec.prefix),
                &workspace
                    .logs_dir()
                    .join(format!("{}_evaluation_stdout.txt", spec.prefix)),
            )
            .await
            .map(Some),
            _ => {
                info!("Evaluation skipped");
                Ok(None)
            }
        };

        // Trials already ran under this prefix; record them even if scoring failed.
        let (evaluation, evaluation_error) = match evaluated {
            Ok(evaluation) => (evaluation, None),
            Err(e) => (None, Some(e)),
        };
        let result = BatchResult {
            batch_id,
            prefix: spec.prefix.clone(),
            spec_digest,
            input,
            trials,
            evaluation,
            started_at,
            finished_at: Utc::now(),
        };
        write_manifest(&workspace.manifest_path(&spec.prefix), &result)?;
        if let Some(e) = evaluation_error {
            warn!(
                event = "batch.evaluation_failed",
                batch_id = %result.batch_id,
                passed = result.passed_count(),
                failed = result.failed_count(),
            );
            return Err(e);
        }

        info!(
            event = "batch.finished",
            batch_id = %result.batch_id,
            passed = result.passed_count(),
            failed = result.failed_count(),
        );
        Ok(result)
    }

    /// Produce the formatted input inside the workspace.
    ///
    /// The file name always starts with the prefix so its artifacts do too.
    async fn prepare_input(&self, spec: &BatchSpec, workspace: &Workspace) -> Result<PathBuf> {
        if spec.format_data {
            let target = workspace
                .formatted_data_dir()
                .join(format!("{}_formatted_data.jsonl", spec.prefix));
            info!(event = "format.started", data = %spec.data.display());
            let output = self.formatter.format(&spec.data, &target).await?;
            let log = workspace
                .logs_dir()
                .join(format!("{}_format_stdout.txt", spec.prefix));
            tokio::fs::write(&log, output.render_log()).await?;
            if !output.passed() {
                return Err(TrialError::FormatterFailure {
                    exit_code: output.exit_code,
                });
            }
            return Ok(target);
        }

        let file_name = spec
            .data
            .file_name()
            .ok_or_else(|| {
                TrialError::InvalidConfig(format!(
                    "data path {} has no file name",
                    spec.data.display()
                ))
            })?
            .to_string_lossy()
            .into_owned();
        let target = workspace
            .formatted_data_dir()
            .join(format!("{}_{file_name}", spec.prefix));
        fs::copy(&spec.data, &target)?;
        Ok(target)
    }
}

fn write_manifest(path: &Path, result: &BatchResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)?;
    Ok(())
}
