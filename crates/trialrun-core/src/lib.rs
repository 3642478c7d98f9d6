//! trialrun core library
//!
//! Building blocks for reproducible multi-model, multi-seed runs of an
//! external predictor:
//! - workspace layout and prefix collision detection
//! - model archive resolution
//! - seed generation and seed-template patching
//! - deterministic artifact naming and input dataset rewriting

pub mod artifact;
pub mod dataset;
pub mod error;
pub mod models;
pub mod namespace;
pub mod seeds;
pub mod split;
pub mod telemetry;
pub mod workspace;

pub use artifact::{artifact_paths, input_base_name, ArtifactPaths};
pub use dataset::rewrite_dataset_field;
pub use error::{Result, TrialError};
pub use models::{
    check_models_available, parse_alias_override, ModelLocations, ModelSpec, ResolvedModel,
    DEFAULT_MODELS,
};
pub use namespace::{check_prefix_unused, validate_prefix};
pub use seeds::{materialize, patch_template, with_seeds, SeedTriple, TemplateCheckout};
pub use split::{split_dataset, SplitConfig, SplitReport};
pub use telemetry::{batch_span, init_tracing};
pub use workspace::{ensure_workspace, Workspace};
