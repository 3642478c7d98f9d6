//! trialrun pipeline - batch orchestration of an external predictor
//!
//! Provides a batch orchestrator that:
//! - Guards the output namespace and checks model archives before any run
//! - Runs every model under fresh seed triples with deterministic artifact names
//! - Captures each runner's console output regardless of exit status
//! - Evaluates all predictions of the batch in one pass

pub mod command;
pub mod dispatch;
pub mod evaluate;
pub mod pipeline;
pub mod runner;
pub mod spec;

// Re-export key types
pub use command::{CommandOutput, CommandSpec};
pub use dispatch::{run_trial, Trial, TrialContext, TrialOutcome};
pub use evaluate::{aggregate, EvaluationSummary};
pub use pipeline::{BatchResult, Pipeline};
pub use runner::{
    AllennlpRunner, CommandEvaluator, DataFormatter, DygieFormatter, Evaluator, ModelInvocation,
    ModelRunner,
};
pub use spec::{BatchSpec, TemplateMode};
