//! Demo binary for tokio-capability-runner.
//!
//! Wires the built-in basic unit into a registry, registers two demo
//! capabilities, and runs the execution cycle until ctrl-c.
//!
//! ## Usage
//!
//! ```text
//! capability-runner [runner.toml]
//! ```
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json` — structured JSON output (production)
//! - `RUST_LOG=info` — log level filter

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use tokio_capability_runner::{
    capability::basic, config, init_tracing, CapabilityLoader, CapabilityRegistry, DataStore,
    ExecutionEngine, InsightDispatcher, RunnerConfig, SelfReflection,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => config::load_from_file(Path::new(&path))?,
        None => {
            // No config file: demo defaults with a short cycle so the loop
            // visibly turns over.
            let mut cfg = RunnerConfig::default();
            cfg.engine.cycle_interval_ms = 2_000;
            cfg
        }
    };

    // The debug toggle raises log volume only; an explicit RUST_LOG wins.
    if cfg.observability.debug && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    let _ = init_tracing();
    info!(
        cycle_interval_ms = cfg.engine.cycle_interval_ms,
        data_dir = %cfg.persistence.data_dir.display(),
        "starting capability runner"
    );

    let store = Arc::new(DataStore::new(&cfg.persistence.data_dir)?);
    let loader = CapabilityLoader::load(vec![basic::unit()])?;
    let registry = CapabilityRegistry::new(loader, Arc::clone(&store))?;

    // Re-registering after a restart is normal: the persisted catalog
    // already carries these names.
    for (name, description) in [
        ("basic.greet", "Greet the world each cycle"),
        ("basic.current_time", "Report the current UTC time"),
    ] {
        if let Err(e) = registry.add(name, description) {
            warn!(capability = name, error = %e, "capability not added");
        }
    }
    info!(capabilities = registry.len(), "catalog ready");

    let reflection = SelfReflection::new(cfg.analysis.clone());
    let engine = Arc::new(ExecutionEngine::new(
        registry,
        reflection.clone(),
        InsightDispatcher::with_logging(),
        store,
        cfg.engine.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    engine_task.await??;

    let status = engine.status();
    info!(
        cycles = status.cycles_completed,
        entries = status.entries_recorded,
        "runner exited"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&reflection.analyze())?
    );

    Ok(())
}
