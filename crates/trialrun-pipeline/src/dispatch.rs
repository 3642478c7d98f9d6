//! Single-trial dispatch: seed template handling, runner invocation and log capture.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trialrun_core::{
    artifact_paths, materialize, with_seeds, ArtifactPaths, ResolvedModel, Result, SeedTriple,
    TrialError, Workspace,
};

use crate::command::CommandOutput;
use crate::runner::{ModelInvocation, ModelRunner};
use crate::spec::TemplateMode;

/// One execution of a model under an optional seed triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    /// Zero-based position within the model's trials.
    pub index: usize,
    pub seeds: Option<SeedTriple>,
}

/// Inputs shared by every trial of one model.
pub struct TrialContext<'a> {
    pub workspace: &'a Workspace,
    pub model: &'a ResolvedModel,
    /// Formatted input, already rewritten for this model's dataset.
    pub input: &'a Path,
    /// Stem used in artifact names.
    pub base_name: &'a str,
    pub template: Option<&'a Path>,
    pub template_mode: TemplateMode,
}

/// Record of a finished trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub model: String,
    pub dataset: String,
    pub index: usize,
    pub seeds: Option<SeedTriple>,
    pub artifacts: ArtifactPaths,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl TrialOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run one trial and persist its console log.
///
/// A failing or unstartable runner is recorded in the outcome, not returned
/// as an error. Errors are reserved for template and filesystem problems.
pub async fn run_trial(
    runner: &dyn ModelRunner,
    ctx: &TrialContext<'_>,
    trial: Trial,
) -> Result<TrialOutcome> {
    let model = &ctx.model.spec;
    let artifacts = artifact_paths(
        ctx.workspace,
        ctx.base_name,
        &model.name,
        trial.seeds.map(|s| s.random_seed),
    );

    info!(
        event = "trial.started",
        model = %model.name,
        trial = trial.index,
        random_seed = trial.seeds.map(|s| s.random_seed),
    );

    let output = match (trial.seeds, ctx.template) {
        (Some(seeds), Some(template)) => match ctx.template_mode {
            TemplateMode::Shared => {
                let paths = &artifacts;
                with_seeds(template, &seeds, |patched| async move {
                    Ok::<_, TrialError>(
                        invoke(runner, ctx, paths, Some(patched), trial.seeds).await,
                    )
                })
                .await?
            }
            TemplateMode::Isolated => {
                let private = tempfile::tempdir()?;
                let patched = materialize(template, &seeds, private.path())?;
                invoke(runner, ctx, &artifacts, Some(patched), trial.seeds).await
            }
        },
        (seeds, _) => invoke(runner, ctx, &artifacts, None, seeds).await,
    };

    tokio::fs::write(&artifacts.log, output.render_log()).await?;

    let outcome = TrialOutcome {
        model: model.name.clone(),
        dataset: model.dataset.clone(),
        index: trial.index,
        seeds: trial.seeds,
        artifacts,
        exit_code: output.exit_code,
        duration_ms: output.duration_ms,
    };

    if outcome.passed() {
        info!(
            event = "trial.finished",
            model = %outcome.model,
            trial = outcome.index,
            duration_ms = outcome.duration_ms,
        );
    } else {
        let failure = TrialError::RunnerFailure {
            model: outcome.model.clone(),
            exit_code: outcome.exit_code,
        };
        warn!(
            event = "trial.failed",
            trial = outcome.index,
            log = %outcome.artifacts.log.display(),
            error = %failure,
        );
    }
    Ok(outcome)
}

async fn invoke(
    runner: &dyn ModelRunner,
    ctx: &TrialContext<'_>,
    artifacts: &ArtifactPaths,
    template: Option<PathBuf>,
    seeds: Option<SeedTriple>,
) -> CommandOutput {
    let invocation = ModelInvocation {
        model: ctx.model.spec.clone(),
        archive: ctx.model.archive.clone(),
        input: ctx.input.to_path_buf(),
        prediction_path: artifacts.prediction.clone(),
        template,
        seeds,
    };
    match runner.run(&invocation).await {
        Ok(output) => output,
        Err(e) => CommandOutput::spawn_failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use trialrun_core::{ensure_workspace, ModelSpec};

    const TEMPLATE: &str = "random_seed: 13370,\nnumpy_seed: 1337,\npytorch_seed: 133,\n";

    /// Records the template content seen during each run.
    struct RecordingRunner {
        seen_templates: Mutex<Vec<String>>,
        exit_code: i32,
    }

    #[async_trait]
    impl ModelRunner for RecordingRunner {
        async fn run(&self, invocation: &ModelInvocation) -> std::io::Result<CommandOutput> {
            if let Some(template) = &invocation.template {
                self.seen_templates
                    .lock()
                    .unwrap()
                    .push(fs::read_to_string(template)?);
            }
            fs::write(&invocation.prediction_path, "{}\n")?;
            Ok(CommandOutput {
                exit_code: self.exit_code,
                stdout: "predicting".to_string(),
                stderr: if self.exit_code == 0 { String::new() } else { "CUDA error".to_string() },
                duration_ms: 1,
            })
        }
    }

    struct UnstartableRunner;

    #[async_trait]
    impl ModelRunner for UnstartableRunner {
        async fn run(&self, _invocation: &ModelInvocation) -> std::io::Result<CommandOutput> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "allennlp not found"))
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        workspace: Workspace,
        model: ResolvedModel,
        input: PathBuf,
        template: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let (workspace, _) = ensure_workspace(tmp.path().join("ws")).unwrap();
        let input = workspace.formatted_data_dir().join("run1_data.jsonl");
        fs::write(&input, "{\"dataset\":\"scierc\"}\n").unwrap();
        let template = tmp.path().join("template.libsonnet");
        fs::write(&template, TEMPLATE).unwrap();
        Fixture {
            _tmp: tmp,
            workspace,
            model: ResolvedModel {
                spec: ModelSpec {
                    name: "scierc".to_string(),
                    dataset: "scierc".to_string(),
                },
                archive: PathBuf::from("scierc.tar.gz"),
            },
            input,
            template,
        }
    }

    fn context<'a>(f: &'a Fixture, mode: TemplateMode) -> TrialContext<'a> {
        TrialContext {
            workspace: &f.workspace,
            model: &f.model,
            input: &f.input,
            base_name: "run1_data",
            template: Some(&f.template),
            template_mode: mode,
        }
    }

    #[tokio::test]
    async fn shared_mode_patches_then_restores_template() {
        let f = fixture();
        let runner = RecordingRunner {
            seen_templates: Mutex::new(Vec::new()),
            exit_code: 0,
        };
        let trial = Trial {
            index: 0,
            seeds: Some(SeedTriple::from_base(54321)),
        };

        let outcome = run_trial(&runner, &context(&f, TemplateMode::Shared), trial)
            .await
            .unwrap();

        assert!(outcome.passed());
        let seen = runner.seen_templates.lock().unwrap();
        assert!(seen[0].contains("random_seed: 54321,"));
        assert_eq!(fs::read_to_string(&f.template).unwrap(), TEMPLATE);
        assert!(outcome
            .artifacts
            .prediction
            .ends_with("run1_data_rand_seed_54321_scierc_predictions.jsonl"));
    }

    #[tokio::test]
    async fn isolated_mode_never_touches_shared_template() {
        let f = fixture();
        let runner = RecordingRunner {
            seen_templates: Mutex::new(Vec::new()),
            exit_code: 0,
        };
        let trial = Trial {
            index: 1,
            seeds: Some(SeedTriple::from_base(24680)),
        };

        run_trial(&runner, &context(&f, TemplateMode::Isolated), trial)
            .await
            .unwrap();

        assert!(runner.seen_templates.lock().unwrap()[0].contains("numpy_seed: 2468,"));
        assert_eq!(fs::read_to_string(&f.template).unwrap(), TEMPLATE);
    }

    #[tokio::test]
    async fn failed_run_is_logged_not_raised() {
        let f = fixture();
        let runner = RecordingRunner {
            seen_templates: Mutex::new(Vec::new()),
            exit_code: 1,
        };
        let trial = Trial {
            index: 0,
            seeds: Some(SeedTriple::from_base(11111)),
        };

        let outcome = run_trial(&runner, &context(&f, TemplateMode::Shared), trial)
            .await
            .unwrap();

        assert!(!outcome.passed());
        let log = fs::read_to_string(&outcome.artifacts.log).unwrap();
        assert!(log.contains("=== STDERR ===\nCUDA error"));
        assert_eq!(fs::read_to_string(&f.template).unwrap(), TEMPLATE);
    }

    #[tokio::test]
    async fn unstartable_runner_still_writes_log() {
        let f = fixture();
        let trial = Trial {
            index: 0,
            seeds: None,
        };

        let outcome = run_trial(&UnstartableRunner, &context(&f, TemplateMode::Isolated), trial)
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, -1);
        assert!(outcome
            .artifacts
            .log
            .ends_with("run1_data_scierc_allennlp_stdout.txt"));
        let log = fs::read_to_string(&outcome.artifacts.log).unwrap();
        assert!(log.contains("allennlp not found"));
    }

    #[tokio::test]
    async fn malformed_template_aborts_the_trial() {
        let f = fixture();
        fs::write(&f.template, "random_seed: 1\n").unwrap();
        let runner = RecordingRunner {
            seen_templates: Mutex::new(Vec::new()),
            exit_code: 0,
        };
        let trial = Trial {
            index: 0,
            seeds: Some(SeedTriple::from_base(11111)),
        };

        for mode in [TemplateMode::Shared, TemplateMode::Isolated] {
            let err = run_trial(&runner, &context(&f, mode), trial).await.unwrap_err();
            assert!(matches!(err, TrialError::MalformedTemplate { .. }));
        }
        assert!(runner.seen_templates.lock().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&f.template).unwrap(), "random_seed: 1\n");
    }
}
