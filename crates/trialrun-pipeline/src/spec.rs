//! Batch specification and identity.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use trialrun_core::{validate_prefix, ModelSpec, Result, TrialError};

/// How the seed template is handed to each trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    /// Each trial gets a private patched copy; trials may run concurrently.
    #[default]
    Isolated,

    /// The shared template is patched in place and restored after each trial.
    Shared,
}

/// Full description of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Workspace root.
    pub root: PathBuf,

    /// Prefix scoping every artifact of this batch.
    pub prefix: String,

    /// Model runtime checkout (archives, scripts, training config).
    pub runtime: PathBuf,

    /// Raw documents when `format_data`, otherwise formatted JSONL.
    pub data: PathBuf,

    pub format_data: bool,

    pub models: Vec<ModelSpec>,

    pub num_trials: usize,

    /// Seed template; required when `num_trials > 1`.
    pub seed_template: Option<PathBuf>,

    pub template_mode: TemplateMode,

    /// Maximum concurrent trials per model (isolated mode only).
    pub jobs: usize,

    /// Fixed seed for drawing trial seeds; entropy when unset.
    pub rng_seed: Option<u64>,

    /// Skip evaluation when `false`.
    pub evaluate: bool,

    pub gold_standard: Option<PathBuf>,
}

impl BatchSpec {
    /// Whether trial seeds are drawn (and embedded in artifact names).
    pub fn seeded(&self) -> bool {
        self.num_trials > 1
    }

    /// Check the batch for inconsistencies before anything touches disk.
    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix)?;

        if self.models.is_empty() {
            return Err(TrialError::InvalidConfig(
                "at least one model must be requested".to_string(),
            ));
        }
        if self.num_trials == 0 {
            return Err(TrialError::InvalidConfig(
                "number of trials must be at least 1".to_string(),
            ));
        }
        if self.jobs == 0 {
            return Err(TrialError::InvalidConfig(
                "jobs must be at least 1".to_string(),
            ));
        }
        if self.jobs > 1 && self.template_mode == TemplateMode::Shared {
            return Err(TrialError::InvalidConfig(
                "concurrent trials require isolated seed templates".to_string(),
            ));
        }
        if self.seeded() {
            match &self.seed_template {
                Some(path) if path.is_file() => {}
                Some(path) => {
                    return Err(TrialError::InvalidConfig(format!(
                        "seed template {} does not exist",
                        path.display()
                    )))
                }
                None => {
                    return Err(TrialError::InvalidConfig(
                        "multiple trials require a seed template".to_string(),
                    ))
                }
            }
        }
        if self.evaluate && self.gold_standard.is_none() {
            return Err(TrialError::InvalidConfig(
                "evaluation requires a gold standard (or disable evaluation)".to_string(),
            ));
        }
        if !self.data.exists() {
            return Err(TrialError::InvalidConfig(format!(
                "data path {} does not exist",
                self.data.display()
            )));
        }
        Ok(())
    }

    /// Deterministic SHA-256 digest of the batch specification.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
