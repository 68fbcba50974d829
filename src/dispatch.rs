//! # Insight-Action Dispatcher
//!
//! ## Responsibility
//! Inspect an [`AnalysisReport`] and invoke the corrective handler for each
//! matched insight category. Categories are independent — several handlers
//! may fire for one report.
//!
//! ## Guarantees
//! - Exactly one handler per matched category
//! - A handler failure is caught per-insight; the remaining insights are
//!   still evaluated
//! - Unmatched suggestion phrases are ignored, never errors — unknown
//!   categories stay forward-compatible
//!
//! ## NOT Responsible For
//! - The handlers' remediation logic (implementations decide; the default
//!   [`LoggingActions`] only logs)
//! - Producing the report (that belongs to `reflection`)

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::reflection::{
    AnalysisReport, SummaryStats, TrendAnalysis, TrendDirection,
};

/// Trend strength above which a decreasing trend is acted on.
const TREND_STRENGTH_FLOOR: f64 = 0.5;

/// Error returned by an insight handler.
#[derive(Debug, Error)]
#[error("insight handler failed: {0}")]
pub struct DispatchError(
    /// What the handler reported.
    pub String,
);

/// Corrective action handlers, one per insight category.
///
/// Implement this to wire real remediation into the runner; the dispatcher
/// calls each handler with the sub-object scoped to its insight.
pub trait InsightActions: Send + Sync {
    /// A sustained decreasing performance trend was detected.
    fn on_decreasing_performance(&self, trend: &TrendAnalysis) -> Result<(), DispatchError>;

    /// At least one entry was flagged as a statistical outlier.
    fn on_anomalies(&self, summary: &SummaryStats, flags: &[bool]) -> Result<(), DispatchError>;

    /// Mean execution time exceeded the slow-task threshold.
    fn on_slow_tasks(&self, suggestion: &str) -> Result<(), DispatchError>;

    /// Success rate fell below the reliability floor.
    fn on_unreliable_capabilities(&self, suggestion: &str) -> Result<(), DispatchError>;

    /// The analysis suggested expanding the capability set.
    fn on_new_capabilities(&self, suggestion: &str) -> Result<(), DispatchError>;
}

/// Default handlers: log each insight and do nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingActions;

impl InsightActions for LoggingActions {
    fn on_decreasing_performance(&self, trend: &TrendAnalysis) -> Result<(), DispatchError> {
        info!(
            slope = trend.slope,
            strength = trend.strength,
            "addressing decreasing performance trend"
        );
        Ok(())
    }

    fn on_anomalies(&self, summary: &SummaryStats, flags: &[bool]) -> Result<(), DispatchError> {
        let count = flags.iter().filter(|&&f| f).count();
        info!(count, mean = summary.mean, "addressing detected anomalies");
        Ok(())
    }

    fn on_slow_tasks(&self, suggestion: &str) -> Result<(), DispatchError> {
        info!(suggestion, "optimizing slow tasks");
        Ok(())
    }

    fn on_unreliable_capabilities(&self, suggestion: &str) -> Result<(), DispatchError> {
        info!(suggestion, "improving capability reliability");
        Ok(())
    }

    fn on_new_capabilities(&self, suggestion: &str) -> Result<(), DispatchError> {
        info!(suggestion, "considering new capabilities");
        Ok(())
    }
}

/// Routes analysis insights to their corrective handlers.
pub struct InsightDispatcher {
    actions: Box<dyn InsightActions>,
}

impl InsightDispatcher {
    /// Build a dispatcher over the given handlers.
    pub fn new(actions: Box<dyn InsightActions>) -> Self {
        Self { actions }
    }

    /// Build a dispatcher that only logs ([`LoggingActions`]).
    pub fn with_logging() -> Self {
        Self::new(Box::new(LoggingActions))
    }

    /// Inspect the report and invoke the handler for every matched insight
    /// category. Returns the number of handlers invoked.
    ///
    /// A [`AnalysisReport::NoData`] report dispatches nothing. Handler
    /// failures are logged and do not stop evaluation of the remaining
    /// insights.
    pub fn act(&self, analysis: &AnalysisReport) -> usize {
        let Some(report) = analysis.as_report() else {
            debug!("no performance data, nothing to dispatch");
            return 0;
        };

        let mut dispatched = 0usize;

        if report.trend.direction == TrendDirection::Decreasing
            && report.trend.strength > TREND_STRENGTH_FLOOR
        {
            dispatched += 1;
            if let Err(e) = self.actions.on_decreasing_performance(&report.trend) {
                warn!(error = %e, "decreasing-performance handler failed");
            }
        }

        if report.anomalies.iter().any(|&f| f) {
            dispatched += 1;
            if let Err(e) = self.actions.on_anomalies(&report.summary, &report.anomalies) {
                warn!(error = %e, "anomaly handler failed");
            }
        }

        for suggestion in &report.areas_for_improvement {
            let result = if suggestion.starts_with("Optimize execution") {
                dispatched += 1;
                self.actions.on_slow_tasks(suggestion)
            } else if suggestion.starts_with("Improve reliability") {
                dispatched += 1;
                self.actions.on_unreliable_capabilities(suggestion)
            } else if suggestion.starts_with("Consider adding new capabilities") {
                dispatched += 1;
                self.actions.on_new_capabilities(suggestion)
            } else {
                debug!(%suggestion, "no handler for suggestion, ignoring");
                Ok(())
            };
            if let Err(e) = result {
                warn!(error = %e, %suggestion, "suggestion handler failed");
            }
        }

        dispatched
    }
}
