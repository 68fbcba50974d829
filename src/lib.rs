//! # tokio-capability-runner
//!
//! A self-monitoring capability runner over Tokio.
//!
//! ## Architecture
//!
//! Capabilities are named units of work discovered from unit manifests,
//! cataloged by a registry, and executed on a fixed cycle:
//!
//! ```text
//! CapabilityLoader → CapabilityRegistry → ExecutionEngine
//!                                              │ one PerformanceEntry per attempt
//!                                              ▼
//!                                        SelfReflection ──► InsightDispatcher
//! ```
//!
//! Each cycle executes every registered capability, records its outcome,
//! analyzes the accumulated history (trend, outliers, forecast), and routes
//! the resulting insights to corrective action handlers.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod persistence;
pub mod reflection;

// Re-exports for convenience
pub use capability::{
    loader::CapabilityLoader, registry::CapabilityRegistry, CapabilityError, UnitManifest,
};
pub use config::RunnerConfig;
pub use dispatch::InsightDispatcher;
pub use engine::{EngineState, ExecutionEngine};
pub use persistence::DataStore;
pub use reflection::{AnalysisReport, PerformanceEntry, SelfReflection};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=debug` raises
/// log volume without changing runner behavior).
///
/// # Errors
///
/// Returns [`RunnerError::Other`] if a global subscriber has already been
/// set (e.g. by a previous call or a test harness).
pub fn init_tracing() -> Result<(), RunnerError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| RunnerError::Other(format!("tracing init failed: {e}")))
}

/// Top-level runner errors.
///
/// Every subsystem error converts into a variant here so binaries can use a
/// single error type at the `main` boundary. The original cause is always
/// preserved via `#[source]` chaining.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A capability loader or registry operation failed.
    #[error(transparent)]
    Capability(#[from] capability::CapabilityError),

    /// A performance entry was rejected or reflection failed.
    #[error(transparent)]
    Reflection(#[from] reflection::SelfReflectionError),

    /// A persistence load or save failed.
    #[error(transparent)]
    Persistence(#[from] persistence::PersistenceError),

    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// The execution engine stopped on a fatal orchestration error.
    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}
