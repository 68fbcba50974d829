//! # Execution Engine
//!
//! ## Responsibility
//! Drive the core loop: each cycle executes every registered capability in
//! catalog order, records one performance entry per attempt, feeds the
//! history to self-reflection, routes the resulting insights to the
//! dispatcher, then waits for the next cycle.
//!
//! ## State machine
//! ```text
//! Idle → Running → (Executing → Reflecting → Waiting)* → Stopped
//! ```
//!
//! ## Guarantees
//! - Failure isolation: one capability's failure is recorded and the cycle
//!   continues — every listed capability is attempted
//! - Fatal orchestration errors (rejected entry, persistence failure) stop
//!   the loop and surface; the cause is logged first
//! - Cooperative stop: the shutdown signal is observed between cycles, so
//!   the current cycle always completes
//!
//! ## NOT Responsible For
//! - What the corrective handlers do (that belongs to `dispatch`)
//! - Catalog mutation (that belongs to `registry`)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::capability::registry::CapabilityRegistry;
use crate::dispatch::InsightDispatcher;
use crate::persistence::{DataStore, PersistenceError};
use crate::reflection::{AnalysisReport, PerformanceEntry, SelfReflection, SelfReflectionError};

// ── Errors ────────────────────────────────────────────────────────────────

/// Fatal orchestration errors that stop the engine.
///
/// These are distinct from individual capability failures, which are
/// recorded as failed performance entries and never abort a cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A cycle's performance entry was rejected by reflection.
    #[error("performance logging failed")]
    Reflection(#[from] SelfReflectionError),

    /// The cycle's performance snapshot could not be persisted.
    #[error("failed to persist cycle performance data")]
    Persistence(#[from] PersistenceError),
}

// ── Configuration ─────────────────────────────────────────────────────────

fn default_cycle_interval_ms() -> u64 {
    60_000
}
fn default_true() -> bool {
    true
}

/// Configuration for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed inter-cycle interval in milliseconds.
    pub cycle_interval_ms: u64,
    /// Whether each cycle's entries are persisted as a snapshot.
    pub persist_performance: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            persist_performance: default_true(),
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Constructed, not yet running.
    Idle,
    /// The cycle loop is active.
    Running,
    /// The loop has exited, cleanly or fatally.
    Stopped,
}

/// Point-in-time view of the engine's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    /// Current lifecycle state.
    pub state: EngineState,
    /// Completed cycles since construction.
    pub cycles_completed: u64,
    /// Performance entries recorded since construction.
    pub entries_recorded: u64,
}

// ── ExecutionEngine ───────────────────────────────────────────────────────

/// Orchestrates repeated execution cycles over the capability catalog.
pub struct ExecutionEngine {
    registry: CapabilityRegistry,
    reflection: SelfReflection,
    dispatcher: InsightDispatcher,
    store: Arc<DataStore>,
    cfg: EngineConfig,
    state: Mutex<EngineState>,
    cycles: AtomicU64,
    entries: AtomicU64,
}

impl ExecutionEngine {
    /// Wire an engine over its collaborators.
    pub fn new(
        registry: CapabilityRegistry,
        reflection: SelfReflection,
        dispatcher: InsightDispatcher,
        store: Arc<DataStore>,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            registry,
            reflection,
            dispatcher,
            store,
            cfg,
            state: Mutex::new(EngineState::Idle),
            cycles: AtomicU64::new(0),
            entries: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Snapshot of the engine's progress counters.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state(),
            cycles_completed: self.cycles.load(Ordering::Relaxed),
            entries_recorded: self.entries.load(Ordering::Relaxed),
        }
    }

    /// Run the cycle loop until the shutdown signal flips to `true`.
    ///
    /// The signal is checked between cycles only — a cycle in progress
    /// always completes. The inter-cycle wait is a blocking pause,
    /// cancellable by the same signal.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when cycle-level orchestration fails; the
    /// engine transitions to [`EngineState::Stopped`] and the cause is
    /// logged before returning. Individual capability failures never reach
    /// here.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        *self.state.lock() = EngineState::Running;
        info!(
            cycle_interval_ms = self.cfg.cycle_interval_ms,
            "execution engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_cycle() {
                error!(error = %e, "fatal error in execution cycle, stopping engine");
                *self.state.lock() = EngineState::Stopped;
                return Err(e);
            }

            self.reflect_and_dispatch();
            self.cycles.fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.cfg.cycle_interval_ms)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        *self.state.lock() = EngineState::Stopped;
        info!("execution engine stopped");
        Ok(())
    }

    /// Execute one full cycle: every capability currently listed by the
    /// registry, in insertion order, one recorded entry per attempt.
    ///
    /// Public so tests and embedders can drive single cycles without the
    /// loop. Returns the number of entries recorded.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if an entry is rejected by reflection or the
    /// cycle snapshot cannot be persisted — fatal conditions, unlike
    /// individual capability failures, which are recorded and skipped over.
    pub fn run_cycle(&self) -> Result<usize, EngineError> {
        let listed = self.registry.list();
        debug!(capabilities = listed.len(), "executing task cycle");

        let mut cycle_entries = Vec::with_capacity(listed.len());
        for name in listed.keys() {
            let entry = self.execute_capability(name);
            self.reflection.log_performance(entry.clone())?;
            self.entries.fetch_add(1, Ordering::Relaxed);
            cycle_entries.push(entry);
        }

        if self.cfg.persist_performance && !cycle_entries.is_empty() {
            self.store.save_performance(&cycle_entries)?;
        }

        Ok(cycle_entries.len())
    }

    /// Execute a single capability and capture its outcome as an entry.
    ///
    /// A failure is caught here — recorded with a failure marker and no
    /// result — so the cycle can attempt every remaining capability.
    pub fn execute_capability(&self, name: &str) -> PerformanceEntry {
        let started = Instant::now();
        match self.registry.execute(name, &[]) {
            Ok(result) => {
                let elapsed = started.elapsed().as_secs_f64();
                debug!(capability = name, execution_time = elapsed, "capability succeeded");
                PerformanceEntry::success(name, result, elapsed)
            }
            Err(e) => {
                let elapsed = started.elapsed().as_secs_f64();
                warn!(capability = name, error = %e, "capability execution failed");
                PerformanceEntry::failure(name, elapsed)
            }
        }
    }

    /// Run a reflection pass over the accumulated history and dispatch the
    /// resulting insights. Returns the report for inspection.
    pub fn reflect_and_dispatch(&self) -> AnalysisReport {
        let report = self.reflection.analyze();
        let dispatched = self.dispatcher.act(&report);
        if dispatched > 0 {
            info!(insights = dispatched, "corrective actions dispatched");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{loader::CapabilityLoader, UnitManifest};
    use crate::reflection::{AnalysisConfig, ExecutionStatus};
    use serde_json::json;
    use tempfile::TempDir;

    fn demo_unit() -> UnitManifest {
        UnitManifest::new("demo")
            .entry("greet", "always succeeds", |_| Ok(json!("hello")))
            .entry("fail_always", "always fails", |_| Err("boom".into()))
    }

    fn make_engine(dir: &TempDir) -> ExecutionEngine {
        let loader = CapabilityLoader::load(vec![demo_unit()]).unwrap();
        let store = Arc::new(DataStore::new(dir.path()).unwrap());
        let registry = CapabilityRegistry::new(loader, Arc::clone(&store)).unwrap();
        ExecutionEngine::new(
            registry,
            SelfReflection::new(AnalysisConfig::default()),
            InsightDispatcher::with_logging(),
            store,
            EngineConfig {
                cycle_interval_ms: 10,
                persist_performance: true,
            },
        )
    }

    #[test]
    fn test_engine_starts_idle() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir);
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.status().cycles_completed, 0);
    }

    #[test]
    fn test_cycle_with_empty_catalog_records_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir);
        assert_eq!(engine.run_cycle().unwrap(), 0);
        assert!(matches!(engine.reflection.analyze(), AnalysisReport::NoData));
    }

    #[test]
    fn test_failing_capability_does_not_abort_cycle() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir);
        // fail_always registered first: its failure must not prevent greet
        // from producing an entry in the same cycle.
        engine.registry.add("demo.fail_always", "always fails").unwrap();
        engine.registry.add("demo.greet", "always succeeds").unwrap();

        assert_eq!(engine.run_cycle().unwrap(), 2);
        let history = engine.reflection.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, ExecutionStatus::Failure);
        assert!(history[0].result.is_none());
        assert_eq!(history[1].status, ExecutionStatus::Success);
        assert_eq!(history[1].result, Some(json!("hello")));
    }

    #[test]
    fn test_cycle_persists_snapshot() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir);
        engine.registry.add("demo.greet", "always succeeds").unwrap();
        engine.run_cycle().unwrap();
        let persisted = engine.store.load_performance().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].capability_name, "demo.greet");
    }

    #[test]
    fn test_reflect_and_dispatch_returns_report() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir);
        engine.registry.add("demo.greet", "always succeeds").unwrap();
        engine.run_cycle().unwrap();
        let report = engine.reflect_and_dispatch();
        assert_eq!(report.as_report().unwrap().total_tasks, 1);
    }

    #[tokio::test]
    async fn test_loop_runs_cycles_until_stopped() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(make_engine(&dir));
        engine.registry.add("demo.greet", "always succeeds").unwrap();

        let (tx, rx) = watch::channel(false);
        let engine_clone = Arc::clone(&engine);
        let handle = tokio::spawn(async move { engine_clone.run(rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop within 2s")
            .expect("join error")
            .expect("engine error");

        let status = engine.status();
        assert_eq!(status.state, EngineState::Stopped);
        assert!(status.cycles_completed >= 1);
        assert!(status.entries_recorded >= 1);
    }

    #[tokio::test]
    async fn test_stop_before_first_cycle() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(make_engine(&dir));
        let (tx, rx) = watch::channel(true);
        drop(tx);
        engine.run(rx).await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.status().cycles_completed, 0);
    }

    #[test]
    fn test_engine_config_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.cycle_interval_ms, 60_000);
        assert!(cfg.persist_performance);
    }
}
