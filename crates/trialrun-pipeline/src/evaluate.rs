//! Batch-level evaluation over every prediction file sharing a prefix.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trialrun_core::artifact::PREDICTIONS_SUFFIX;
use trialrun_core::{Result, TrialError};

use crate::command::CommandOutput;
use crate::runner::Evaluator;

/// Outcome of a successful evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Prediction files handed to the evaluator, sorted by name.
    pub selected: Vec<PathBuf>,
    pub report_path: PathBuf,
    pub log_path: PathBuf,
}

/// Prediction files in `predictions_dir` whose name starts with `prefix`.
pub fn select_predictions(predictions_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut selected = Vec::new();
    for entry in fs::read_dir(predictions_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.ends_with(PREDICTIONS_SUFFIX) {
            selected.push(entry.path());
        }
    }
    selected.sort();
    Ok(selected)
}

/// Run the evaluator once over the batch's predictions.
///
/// Selected files are staged into a private directory so the evaluator only
/// sees this batch. Its console output goes to `log_path` whatever the exit
/// status; an evaluator that cannot be started is logged as exit code -1.
/// A non-zero exit becomes [`TrialError::EvaluatorFailure`]; no
/// artifact is rolled back.
pub async fn aggregate(
    evaluator: &dyn Evaluator,
    predictions_dir: &Path,
    gold_standard: &Path,
    prefix: &str,
    report_path: &Path,
    log_path: &Path,
) -> Result<EvaluationSummary> {
    let selected = select_predictions(predictions_dir, prefix)?;
    if selected.is_empty() {
        warn!(prefix = %prefix, "No prediction files found for evaluation");
    }

    let staging = tempfile::tempdir()?;
    for path in &selected {
        if let Some(name) = path.file_name() {
            fs::copy(path, staging.path().join(name))?;
        }
    }

    info!(
        event = "evaluation.started",
        predictions = selected.len(),
        gold_standard = %gold_standard.display(),
    );
    let output = match evaluator
        .evaluate(staging.path(), gold_standard, report_path)
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "Evaluator could not be started");
            CommandOutput::spawn_failure(&e)
        }
    };
    tokio::fs::write(log_path, output.render_log()).await?;

    if !output.passed() {
        return Err(TrialError::EvaluatorFailure {
            exit_code: output.exit_code,
        });
    }

    info!(
        event = "evaluation.finished",
        report = %report_path.display(),
        duration_ms = output.duration_ms,
    );
    Ok(EvaluationSummary {
        selected,
        report_path: report_path.to_path_buf(),
        log_path: log_path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Writes the names of the staged files as the report.
    struct ListingEvaluator {
        exit_code: i32,
    }

    #[async_trait]
    impl Evaluator for ListingEvaluator {
        async fn evaluate(
            &self,
            predictions_dir: &Path,
            _gold_standard: &Path,
            report_path: &Path,
        ) -> std::io::Result<CommandOutput> {
            let mut names: Vec<String> = fs::read_dir(predictions_dir)?
                .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect::<std::io::Result<_>>()?;
            names.sort();
            fs::write(report_path, format!("file\n{}\n", names.join("\n")))?;
            Ok(CommandOutput {
                exit_code: self.exit_code,
                stdout: format!("scored {}", names.len()),
                stderr: String::new(),
                duration_ms: 1,
            })
        }
    }

    struct MissingEvaluator;

    #[async_trait]
    impl Evaluator for MissingEvaluator {
        async fn evaluate(
            &self,
            _predictions_dir: &Path,
            _gold_standard: &Path,
            _report_path: &Path,
        ) -> std::io::Result<CommandOutput> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "python3 not found",
            ))
        }
    }

    fn populate(dir: &Path) {
        for name in [
            "run1_data_scierc_predictions.jsonl",
            "run1_data_genia_predictions.jsonl",
            "run2_data_scierc_predictions.jsonl",
            "run1_notes.txt",
        ] {
            fs::write(dir.join(name), "{}\n").unwrap();
        }
    }

    #[test]
    fn selection_is_prefix_and_suffix_scoped() {
        let tmp = tempfile::tempdir().unwrap();
        populate(tmp.path());

        let selected = select_predictions(tmp.path(), "run1").unwrap();

        let names: Vec<_> = selected
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "run1_data_genia_predictions.jsonl",
                "run1_data_scierc_predictions.jsonl"
            ]
        );
    }

    #[tokio::test]
    async fn evaluator_only_sees_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let preds = tmp.path().join("preds");
        fs::create_dir(&preds).unwrap();
        populate(&preds);
        let report = tmp.path().join("run1_model_performance.csv");
        let log = tmp.path().join("run1_evaluation_stdout.txt");

        let summary = aggregate(
            &ListingEvaluator { exit_code: 0 },
            &preds,
            Path::new("gold.jsonl"),
            "run1",
            &report,
            &log,
        )
        .await
        .unwrap();

        assert_eq!(summary.selected.len(), 2);
        let body = fs::read_to_string(&report).unwrap();
        assert!(body.contains("run1_data_scierc_predictions.jsonl"));
        assert!(!body.contains("run2_"));
        assert!(fs::read_to_string(&log).unwrap().contains("scored 2"));
    }

    #[tokio::test]
    async fn evaluator_failure_is_surfaced_with_log() {
        let tmp = tempfile::tempdir().unwrap();
        populate(tmp.path());
        let report = tmp.path().join("report.csv");
        let log = tmp.path().join("eval.txt");

        let err = aggregate(
            &ListingEvaluator { exit_code: 2 },
            tmp.path(),
            Path::new("gold.jsonl"),
            "run1",
            &report,
            &log,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TrialError::EvaluatorFailure { exit_code: 2 }));
        assert!(log.exists());
    }

    #[tokio::test]
    async fn unstartable_evaluator_still_writes_log() {
        let tmp = tempfile::tempdir().unwrap();
        populate(tmp.path());
        let report = tmp.path().join("report.csv");
        let log = tmp.path().join("run1_evaluation_stdout.txt");

        let err = aggregate(
            &MissingEvaluator,
            tmp.path(),
            Path::new("gold.jsonl"),
            "run1",
            &report,
            &log,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TrialError::EvaluatorFailure { exit_code: -1 }));
        let body = fs::read_to_string(&log).unwrap();
        assert!(body.contains("python3 not found"));
        assert!(body.contains("=== EXIT CODE: -1 ==="));
    }
}
