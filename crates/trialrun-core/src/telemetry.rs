//! Centralised tracing initialisation for trialrun binaries.
//!
//! Call [`init_tracing`] once at program start. Events from the trialrun
//! crates are shown at the requested level; everything else only from
//! `warn` up, unless `RUST_LOG` says otherwise.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested verbosity.
const TRIALRUN_TARGETS: [&str; 3] = ["trialrun", "trialrun_core", "trialrun_pipeline"];

/// Default filter directives when `RUST_LOG` is not set.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(TRIALRUN_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `json` - newline-delimited JSON, one object per event, carrying the
///   enclosing batch span so every line names its prefix.
/// * `level` - verbosity for the trialrun crates.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    // A subscriber installed earlier (tests, embedding binaries) wins.
    installed.ok();
}

/// Span scoping every event of one batch to its prefix.
///
/// Attach with `tracing::Instrument` so it follows the batch across awaits.
pub fn batch_span(prefix: &str) -> tracing::Span {
    tracing::info_span!("trialrun.batch", prefix = %prefix)
}
