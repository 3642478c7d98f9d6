//! Deterministic artifact naming.
//!
//! Grammar: `{base}[_rand_seed_{seed}]_{model}_predictions.jsonl` and
//! `{base}[_rand_seed_{seed}]_{model}_allennlp_stdout.txt`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::workspace::Workspace;

pub const PREDICTIONS_SUFFIX: &str = "_predictions.jsonl";
pub const LOG_SUFFIX: &str = "_allennlp_stdout.txt";

/// Prediction and log paths for one trial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub prediction: PathBuf,
    pub log: PathBuf,
}

/// Stem shared by all artifact names of one formatted input.
pub fn input_base_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn stem(base: &str, model: &str, seed: Option<u32>) -> String {
    match seed {
        Some(seed) => format!("{base}_rand_seed_{seed}_{model}"),
        None => format!("{base}_{model}"),
    }
}

pub fn prediction_file_name(base: &str, model: &str, seed: Option<u32>) -> String {
    format!("{}{PREDICTIONS_SUFFIX}", stem(base, model, seed))
}

pub fn log_file_name(base: &str, model: &str, seed: Option<u32>) -> String {
    format!("{}{LOG_SUFFIX}", stem(base, model, seed))
}

/// Artifact paths inside `workspace` for a trial.
///
/// `seed` is only embedded when the batch runs more than one trial.
pub fn artifact_paths(
    workspace: &Workspace,
    base: &str,
    model: &str,
    seed: Option<u32>,
) -> ArtifactPaths {
    ArtifactPaths {
        prediction: workspace
            .predictions_dir()
            .join(prediction_file_name(base, model, seed)),
        log: workspace.logs_dir().join(log_file_name(base, model, seed)),
    }
}
