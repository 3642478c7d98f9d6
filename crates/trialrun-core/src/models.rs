//! Model variants and packaged-archive availability.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrialError};

/// Models run when none are requested explicitly.
pub const DEFAULT_MODELS: [&str; 5] = ["ace05", "scierc", "scierc-light", "genia", "genia-light"];

/// Dataset token the runtime expects for a built-in model variant.
///
/// Light variants share the dataset family of their full counterpart.
pub fn builtin_dataset_alias(model: &str) -> Option<&'static str> {
    match model {
        "ace05" => Some("ace05"),
        "scierc" | "scierc-light" => Some("scierc"),
        "genia" | "genia-light" => Some("genia"),
        _ => None,
    }
}

/// A model variant plus the dataset token written into its input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub dataset: String,
}

impl ModelSpec {
    /// Resolve the dataset token from overrides, then built-ins, then the name itself.
    pub fn resolve(name: &str, overrides: &BTreeMap<String, String>) -> Self {
        let dataset = overrides
            .get(name)
            .cloned()
            .or_else(|| builtin_dataset_alias(name).map(str::to_string))
            .unwrap_or_else(|| name.to_string());
        Self {
            name: name.to_string(),
            dataset,
        }
    }
}

/// Parse a `model=token` alias override.
pub fn parse_alias_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((model, token)) if !model.trim().is_empty() && !token.trim().is_empty() => {
            Ok((model.trim().to_string(), token.trim().to_string()))
        }
        _ => Err(TrialError::InvalidConfig(format!(
            "dataset alias '{raw}' must have the form model=token"
        ))),
    }
}

/// The two places packaged model archives may live inside a runtime checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLocations {
    /// Downloaded archives: `<dir>/<model>.tar.gz`.
    pub pretrained_dir: PathBuf,
    /// Locally trained models: `<dir>/<model>/model.tar.gz`.
    pub trained_dir: PathBuf,
}

impl ModelLocations {
    /// Standard locations under a runtime checkout.
    pub fn under_runtime(runtime: impl AsRef<Path>) -> Self {
        let runtime = runtime.as_ref();
        Self {
            pretrained_dir: runtime.join("pretrained"),
            trained_dir: runtime.join("models"),
        }
    }

    fn candidates(&self, model: &str) -> [PathBuf; 2] {
        [
            self.pretrained_dir.join(format!("{model}.tar.gz")),
            self.trained_dir.join(model).join("model.tar.gz"),
        ]
    }
}

/// A model whose archive was found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedModel {
    pub spec: ModelSpec,
    pub archive: PathBuf,
}

/// Resolve every requested model to an archive, failing on the first missing one.
///
/// Runs before any trial so a long batch never discovers a missing sibling late.
pub fn check_models_available(
    models: &[ModelSpec],
    locations: &ModelLocations,
) -> Result<Vec<ResolvedModel>> {
    let mut seen = HashSet::new();
    for model in models {
        if !seen.insert(model.name.as_str()) {
            return Err(TrialError::InvalidConfig(format!(
                "model '{}' requested more than once",
                model.name
            )));
        }
    }

    let mut resolved = Vec::with_capacity(models.len());
    for model in models {
        let candidates = locations.candidates(&model.name);
        match candidates.iter().find(|p| p.is_file()) {
            Some(archive) => {
                debug!(model = %model.name, archive = %archive.display(), "Model archive found");
                resolved.push(ResolvedModel {
                    spec: model.clone(),
                    archive: archive.clone(),
                });
            }
            None => {
                return Err(TrialError::ModelNotFound {
                    model: model.name.clone(),
                    searched: candidates.to_vec(),
                })
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn no_overrides() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn light_variants_share_dataset_family() {
        assert_eq!(ModelSpec::resolve("scierc-light", &no_overrides()).dataset, "scierc");
        assert_eq!(ModelSpec::resolve("genia-light", &no_overrides()).dataset, "genia");
        assert_eq!(ModelSpec::resolve("ace05", &no_overrides()).dataset, "ace05");
    }

    #[test]
    fn unknown_model_aliases_to_itself_unless_overridden() {
        assert_eq!(ModelSpec::resolve("chemprot", &no_overrides()).dataset, "chemprot");

        let mut overrides = BTreeMap::new();
        overrides.insert("chemprot".to_string(), "scierc".to_string());
        assert_eq!(ModelSpec::resolve("chemprot", &overrides).dataset, "scierc");
    }

    #[test]
    fn parse_alias_override_requires_both_sides() {
        assert_eq!(
            parse_alias_override("mine=genia").unwrap(),
            ("mine".to_string(), "genia".to_string())
        );
        assert!(parse_alias_override("mine").is_err());
        assert!(parse_alias_override("=genia").is_err());
        assert!(parse_alias_override("mine=").is_err());
    }

    #[test]
    fn resolves_pretrained_and_trained_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let locations = ModelLocations::under_runtime(tmp.path());
        fs::create_dir_all(&locations.pretrained_dir).unwrap();
        fs::write(locations.pretrained_dir.join("scierc.tar.gz"), "").unwrap();
        fs::create_dir_all(locations.trained_dir.join("mine")).unwrap();
        fs::write(locations.trained_dir.join("mine").join("model.tar.gz"), "").unwrap();

        let models = vec![
            ModelSpec::resolve("scierc", &no_overrides()),
            ModelSpec::resolve("mine", &no_overrides()),
        ];
        let resolved = check_models_available(&models, &locations).unwrap();

        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].archive.ends_with("pretrained/scierc.tar.gz"));
        assert!(resolved[1].archive.ends_with("models/mine/model.tar.gz"));
    }

    #[test]
    fn first_missing_model_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let locations = ModelLocations::under_runtime(tmp.path());
        fs::create_dir_all(&locations.pretrained_dir).unwrap();
        fs::write(locations.pretrained_dir.join("scierc.tar.gz"), "").unwrap();

        let models = vec![
            ModelSpec::resolve("scierc", &no_overrides()),
            ModelSpec::resolve("genia", &no_overrides()),
            ModelSpec::resolve("ace05", &no_overrides()),
        ];
        match check_models_available(&models, &locations).unwrap_err() {
            TrialError::ModelNotFound { model, searched } => {
                assert_eq!(model, "genia");
                assert_eq!(searched.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_models_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let locations = ModelLocations::under_runtime(tmp.path());
        let models = vec![
            ModelSpec::resolve("genia", &no_overrides()),
            ModelSpec::resolve("genia", &no_overrides()),
        ];
        assert!(matches!(
            check_models_available(&models, &locations),
            Err(TrialError::InvalidConfig(_))
        ));
    }
}
