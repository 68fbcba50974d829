//! # Self-Reflection Engine
//!
//! ## Responsibility
//! Accumulate validated [`PerformanceEntry`] records and turn them into an
//! [`AnalysisReport`]: summary statistics, trend direction and strength,
//! per-entry outlier flags, a short-horizon forecast, and deterministic
//! improvement suggestions.
//!
//! ## Guarantees
//! - The history never contains a malformed entry: validation happens
//!   before append
//! - Bounded memory: history is a ring capped at `max_history` entries
//! - `analyze()` over an empty history returns the explicit no-data
//!   marker; derived statistics are never computed on empty input
//!
//! ## NOT Responsible For
//! - Executing capabilities or timing them (that belongs to `engine`)
//! - Acting on the report (that belongs to `dispatch`)

pub mod analytics;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use analytics::{SummaryStats, TrendAnalysis, TrendDirection};

// ── Suggestions ───────────────────────────────────────────────────────────

/// Suggestion emitted when mean execution time exceeds the slow-task
/// threshold.
pub const SUGGEST_SLOW_TASKS: &str = "Optimize execution for slow tasks.";
/// Suggestion emitted when the success rate falls below the floor.
pub const SUGGEST_RELIABILITY: &str = "Improve reliability of capabilities.";
/// Suggestion emitted when tracked resource usage exceeds the ceiling.
pub const SUGGEST_RESOURCE: &str = "Reduce resource usage.";

// ── Errors ────────────────────────────────────────────────────────────────

/// Errors produced by the self-reflection subsystem.
#[derive(Debug, Error)]
pub enum SelfReflectionError {
    /// The entry's capability name was empty.
    #[error("performance entry rejected: capability name must be non-empty")]
    EmptyCapabilityName,

    /// The entry's execution time was negative or not finite.
    #[error("performance entry rejected: execution time {0} must be finite and >= 0")]
    InvalidExecutionTime(f64),
}

// ── Performance entries ───────────────────────────────────────────────────

/// Outcome classification of a single capability attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The capability returned a result.
    Success,
    /// The capability raised a failure; `result` is absent.
    Failure,
}

fn default_category() -> String {
    "capability_execution".to_string()
}

/// One recorded outcome of a single capability invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceEntry {
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Qualified name of the capability that ran.
    pub capability_name: String,
    /// The capability's result; `None` on failure.
    pub result: Option<Value>,
    /// Success or failure marker.
    pub status: ExecutionStatus,
    /// Wall-clock execution time in seconds.
    pub execution_time: f64,
    /// Free-form tag for the kind of work recorded.
    #[serde(default = "default_category")]
    pub category: String,
    /// Resource usage for the attempt, when tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl PerformanceEntry {
    /// Build a successful entry stamped now.
    pub fn success(capability_name: impl Into<String>, result: Value, execution_time: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            capability_name: capability_name.into(),
            result: Some(result),
            status: ExecutionStatus::Success,
            execution_time,
            category: default_category(),
            tokens_used: None,
        }
    }

    /// Build a failed entry stamped now.
    pub fn failure(capability_name: impl Into<String>, execution_time: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            capability_name: capability_name.into(),
            result: None,
            status: ExecutionStatus::Failure,
            execution_time,
            category: default_category(),
            tokens_used: None,
        }
    }
}

// ── Configuration ─────────────────────────────────────────────────────────

fn default_slow_task_threshold() -> f64 {
    1.0
}
fn default_min_success_rate() -> f64 {
    0.8
}
fn default_forecast_steps() -> usize {
    5
}
fn default_anomaly_z_threshold() -> f64 {
    3.0
}
fn default_smoothing_alpha() -> f64 {
    0.5
}
fn default_max_history() -> usize {
    10_000
}

/// Configuration for the self-reflection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Mean execution time (seconds) above which the slow-task suggestion
    /// fires.
    pub slow_task_threshold_secs: f64,
    /// Success-rate floor below which the reliability suggestion fires.
    pub min_success_rate: f64,
    /// Ceiling on tracked token usage; `None` disables the resource rule.
    pub resource_ceiling_tokens: Option<u64>,
    /// How many future values to forecast.
    pub forecast_steps: usize,
    /// Z-score above which an entry is flagged as an outlier.
    pub anomaly_z_threshold: f64,
    /// Smoothing factor for the forecast, in `(0, 1]`.
    pub smoothing_alpha: f64,
    /// Ring-buffer cap on in-memory history.
    pub max_history: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            slow_task_threshold_secs: default_slow_task_threshold(),
            min_success_rate: default_min_success_rate(),
            resource_ceiling_tokens: None,
            forecast_steps: default_forecast_steps(),
            anomaly_z_threshold: default_anomaly_z_threshold(),
            smoothing_alpha: default_smoothing_alpha(),
            max_history: default_max_history(),
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────────────

/// Full analysis over a non-empty performance history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Number of entries analyzed.
    pub total_tasks: usize,
    /// Sum of execution times, seconds.
    pub total_execution_time: f64,
    /// Mean execution time, seconds.
    pub average_execution_time: f64,
    /// Fraction of entries with [`ExecutionStatus::Success`].
    pub success_rate: f64,
    /// Summary statistics of the execution-time series.
    pub summary: SummaryStats,
    /// Trend fit over execution times, ordered by timestamp.
    pub trend: TrendAnalysis,
    /// One flag per entry; `true` marks a statistical outlier.
    pub anomalies: Vec<bool>,
    /// Forecast of the next execution-time values.
    pub forecast: Vec<f64>,
    /// Applicable improvement suggestions.
    pub areas_for_improvement: Vec<String>,
}

/// Outcome of a reflection pass.
///
/// An empty history yields the explicit [`AnalysisReport::NoData`] marker —
/// derived statistics are never computed on empty input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum AnalysisReport {
    /// No performance data has been recorded.
    NoData,
    /// Analysis over the recorded history.
    Report(PerformanceReport),
}

impl AnalysisReport {
    /// The inner report, if the history was non-empty.
    pub fn as_report(&self) -> Option<&PerformanceReport> {
        match self {
            Self::NoData => None,
            Self::Report(r) => Some(r),
        }
    }
}

// ── SelfReflection ────────────────────────────────────────────────────────

struct ReflectInner {
    history: VecDeque<PerformanceEntry>,
    cfg: AnalysisConfig,
}

/// Accumulates performance entries and analyzes them on demand.
///
/// Cheap to clone — all clones share the same bounded history.
#[derive(Clone)]
pub struct SelfReflection {
    inner: Arc<Mutex<ReflectInner>>,
}

impl SelfReflection {
    /// Create a reflection engine with the given configuration.
    pub fn new(cfg: AnalysisConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ReflectInner {
                history: VecDeque::new(),
                cfg,
            })),
        }
    }

    /// Create a reflection engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(AnalysisConfig::default())
    }

    /// Validate and append one performance entry.
    ///
    /// When the ring is full the oldest entry falls off.
    ///
    /// # Errors
    ///
    /// Returns [`SelfReflectionError`] — and appends nothing — when the
    /// capability name is empty or the execution time is negative or not
    /// finite.
    pub fn log_performance(&self, entry: PerformanceEntry) -> Result<(), SelfReflectionError> {
        if entry.capability_name.trim().is_empty() {
            return Err(SelfReflectionError::EmptyCapabilityName);
        }
        if !entry.execution_time.is_finite() || entry.execution_time < 0.0 {
            return Err(SelfReflectionError::InvalidExecutionTime(
                entry.execution_time,
            ));
        }

        let mut inner = self.inner.lock();
        if inner.history.len() >= inner.cfg.max_history {
            inner.history.pop_front();
        }
        debug!(
            capability = %entry.capability_name,
            execution_time = entry.execution_time,
            status = ?entry.status,
            "performance logged"
        );
        inner.history.push_back(entry);
        Ok(())
    }

    /// Snapshot of the current history, oldest first.
    pub fn history(&self) -> Vec<PerformanceEntry> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Whether no entries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().history.is_empty()
    }

    /// Analyze the recorded history.
    ///
    /// Returns [`AnalysisReport::NoData`] for an empty history; otherwise
    /// computes counts, aggregates, summary statistics, the execution-time
    /// trend (timestamp order), outlier flags, a forecast, and every
    /// applicable improvement suggestion. Never fails.
    pub fn analyze(&self) -> AnalysisReport {
        let (mut entries, cfg) = {
            let inner = self.inner.lock();
            (
                inner.history.iter().cloned().collect::<Vec<_>>(),
                inner.cfg.clone(),
            )
        };

        if entries.is_empty() {
            return AnalysisReport::NoData;
        }

        entries.sort_by_key(|e| e.timestamp);
        let times: Vec<f64> = entries.iter().map(|e| e.execution_time).collect();

        let total_tasks = entries.len();
        let total_execution_time: f64 = times.iter().sum();
        let average_execution_time = total_execution_time / total_tasks as f64;
        let successes = entries
            .iter()
            .filter(|e| e.status == ExecutionStatus::Success)
            .count();
        let success_rate = successes as f64 / total_tasks as f64;

        let summary = analytics::summarize(&times);
        let trend = analytics::linear_trend(&times);
        let anomalies = analytics::flag_outliers(&times, cfg.anomaly_z_threshold);
        let forecast = analytics::forecast(&times, cfg.forecast_steps, cfg.smoothing_alpha);

        let mut areas_for_improvement = Vec::new();
        if average_execution_time > cfg.slow_task_threshold_secs {
            areas_for_improvement.push(SUGGEST_SLOW_TASKS.to_string());
        }
        if success_rate < cfg.min_success_rate {
            areas_for_improvement.push(SUGGEST_RELIABILITY.to_string());
        }
        if let Some(ceiling) = cfg.resource_ceiling_tokens {
            let any_tracked = entries.iter().any(|e| e.tokens_used.is_some());
            let total_tokens: u64 = entries.iter().filter_map(|e| e.tokens_used).sum();
            if any_tracked && total_tokens > ceiling {
                areas_for_improvement.push(SUGGEST_RESOURCE.to_string());
            }
        }

        AnalysisReport::Report(PerformanceReport {
            total_tasks,
            total_execution_time,
            average_execution_time,
            success_rate,
            summary,
            trend,
            anomalies,
            forecast,
            areas_for_improvement,
        })
    }
}
