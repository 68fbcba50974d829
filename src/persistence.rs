//! # Data persistence
//!
//! ## Responsibility
//! Save and load versioned JSON snapshots: the capability catalog (one
//! authoritative `catalog.json`) and performance history (one
//! `performance_*.json` file per save, loaded by concatenation).
//!
//! ## Guarantees
//! - Atomic catalog writes: temp file + rename, so a persisted catalog
//!   always corresponds to a state that existed in memory
//! - Version skip: a snapshot whose version does not match
//!   [`DATA_VERSION`] is ignored with a log line, never a crash
//! - Every error names the file it refers to
//!
//! ## NOT Responsible For
//! - Deciding when to save (callers own that)
//! - The capability handles themselves (never persisted; re-resolved from
//!   the loader at startup)

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::reflection::PerformanceEntry;

/// Current version of the persisted data structure.
pub const DATA_VERSION: &str = "1.0";

// ── Errors ────────────────────────────────────────────────────────────────

/// Errors produced by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The data directory could not be created or accessed.
    #[error("unable to create or access data directory '{dir}'")]
    Directory {
        /// The directory path.
        dir: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file could not be read.
    #[error("failed to read '{file}'")]
    Read {
        /// The file path.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file could not be written.
    #[error("failed to write '{file}'")]
    Write {
        /// The file path.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file was not valid JSON.
    #[error("malformed snapshot '{file}'")]
    Malformed {
        /// The file path.
        file: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot could not be serialized.
    #[error("failed to serialize snapshot")]
    Serialize(#[source] serde_json::Error),
}

// ── Persisted shapes ──────────────────────────────────────────────────────

/// The durable projection of a registered capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// Record discriminator; always `"capability"`.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Qualified capability name.
    pub name: String,
    /// Capability description.
    pub description: String,
}

impl CapabilityRecord {
    /// Build a record for the named capability.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            record_type: "capability".to_string(),
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogSnapshot {
    version: String,
    records: Vec<CapabilityRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PerformanceSnapshot {
    version: String,
    performance_data: PerformanceData,
}

#[derive(Debug, Serialize, Deserialize)]
struct PerformanceData {
    entries: Vec<PerformanceEntry>,
}

// ── DataStore ─────────────────────────────────────────────────────────────

/// File-backed store for catalog and performance snapshots.
#[derive(Debug)]
pub struct DataStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl DataStore {
    /// Open (creating if necessary) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Directory`] if the directory cannot be
    /// created or accessed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistenceError::Directory {
            dir: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the capability catalog atomically.
    ///
    /// The snapshot is written to a temp file and renamed over
    /// `catalog.json`, so readers never observe a half-written catalog.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Write`] or
    /// [`PersistenceError::Serialize`] on failure; the previous catalog
    /// file, if any, is left intact.
    pub fn save_catalog(&self, records: &[CapabilityRecord]) -> Result<(), PersistenceError> {
        let snapshot = CatalogSnapshot {
            version: DATA_VERSION.to_string(),
            records: records.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(PersistenceError::Serialize)?;

        let path = self.dir.join("catalog.json");
        let tmp = self.dir.join("catalog.json.tmp");
        fs::write(&tmp, bytes).map_err(|source| PersistenceError::Write {
            file: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| PersistenceError::Write {
            file: path.display().to_string(),
            source,
        })?;

        debug!(count = records.len(), file = %path.display(), "catalog saved");
        Ok(())
    }

    /// Load the persisted capability catalog.
    ///
    /// A missing file yields an empty catalog. A snapshot whose version
    /// does not match [`DATA_VERSION`] is skipped with a log line and also
    /// yields an empty catalog — incompatible data is ignored, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Read`] or
    /// [`PersistenceError::Malformed`] if the file exists but cannot be
    /// read or parsed as JSON at all.
    pub fn load_catalog(&self) -> Result<Vec<CapabilityRecord>, PersistenceError> {
        let path = self.dir.join("catalog.json");
        if !path.exists() {
            return Ok(Vec::new());
        }

        let Some(value) = self.read_compatible(&path)? else {
            return Ok(Vec::new());
        };
        let snapshot: CatalogSnapshot =
            serde_json::from_value(value).map_err(|source| PersistenceError::Malformed {
                file: path.display().to_string(),
                source,
            })?;

        info!(count = snapshot.records.len(), "catalog loaded");
        Ok(snapshot.records)
    }

    /// Save one performance snapshot file for the given entries.
    ///
    /// Every save produces a new `performance_<stamp>_<seq>.json` file.
    /// Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Write`] or
    /// [`PersistenceError::Serialize`] on failure.
    pub fn save_performance(
        &self,
        entries: &[PerformanceEntry],
    ) -> Result<PathBuf, PersistenceError> {
        let snapshot = PerformanceSnapshot {
            version: DATA_VERSION.to_string(),
            performance_data: PerformanceData {
                entries: entries.to_vec(),
            },
        };
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(PersistenceError::Serialize)?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("performance_{stamp}_{seq:04}.json"));
        fs::write(&path, bytes).map_err(|source| PersistenceError::Write {
            file: path.display().to_string(),
            source,
        })?;

        debug!(count = entries.len(), file = %path.display(), "performance snapshot saved");
        Ok(path)
    }

    /// Load performance entries by concatenation across every compatible
    /// `performance_*.json` file, in filename order.
    ///
    /// Version-mismatched files are skipped with a log line.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Read`] or
    /// [`PersistenceError::Malformed`] if a file cannot be read or parsed
    /// as JSON at all.
    pub fn load_performance(&self) -> Result<Vec<PerformanceEntry>, PersistenceError> {
        let mut entries = Vec::new();
        for path in self.performance_files()? {
            let Some(value) = self.read_compatible(&path)? else {
                continue;
            };
            let snapshot: PerformanceSnapshot =
                serde_json::from_value(value).map_err(|source| PersistenceError::Malformed {
                    file: path.display().to_string(),
                    source,
                })?;
            entries.extend(snapshot.performance_data.entries);
        }

        info!(count = entries.len(), "performance entries loaded");
        Ok(entries)
    }

    /// Load only the most recent compatible performance snapshot, if any.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`load_performance`](Self::load_performance).
    pub fn latest_performance(&self) -> Result<Option<Vec<PerformanceEntry>>, PersistenceError> {
        for path in self.performance_files()?.into_iter().rev() {
            let Some(value) = self.read_compatible(&path)? else {
                continue;
            };
            let snapshot: PerformanceSnapshot =
                serde_json::from_value(value).map_err(|source| PersistenceError::Malformed {
                    file: path.display().to_string(),
                    source,
                })?;
            return Ok(Some(snapshot.performance_data.entries));
        }
        Ok(None)
    }

    /// Delete snapshot files older than `days_to_keep` days (by mtime).
    ///
    /// Returns the number of files removed.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Directory`] if the directory cannot be
    /// listed. Per-file stat or remove failures are skipped.
    pub fn clean_old_data(&self, days_to_keep: u64) -> Result<usize, PersistenceError> {
        let cutoff = Duration::from_secs(days_to_keep * 24 * 60 * 60);
        let now = SystemTime::now();
        let mut removed = 0usize;

        let dir_iter = fs::read_dir(&self.dir).map_err(|source| PersistenceError::Directory {
            dir: self.dir.display().to_string(),
            source,
        })?;
        for dir_entry in dir_iter.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(meta) = dir_entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > cutoff && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        info!(removed, days_to_keep, "old snapshot files cleaned");
        Ok(removed)
    }

    // ── Private helpers ───────────────────────────────────────────────────

    /// Sorted list of performance snapshot files.
    fn performance_files(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let dir_iter = fs::read_dir(&self.dir).map_err(|source| PersistenceError::Directory {
            dir: self.dir.display().to_string(),
            source,
        })?;

        let mut files: Vec<PathBuf> = dir_iter
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("performance_") && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Read a snapshot file and return its JSON value if the embedded
    /// version matches [`DATA_VERSION`], `None` (with a log line) if not.
    fn read_compatible(&self, path: &Path) -> Result<Option<serde_json::Value>, PersistenceError> {
        let content = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
            file: path.display().to_string(),
            source,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| PersistenceError::Malformed {
                file: path.display().to_string(),
                source,
            })?;

        if value.get("version").and_then(|v| v.as_str()) == Some(DATA_VERSION) {
            Ok(Some(value))
        } else {
            info!(file = %path.display(), "skipping snapshot with incompatible version");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{ExecutionStatus, PerformanceEntry};
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(name: &str, secs: f64) -> PerformanceEntry {
        PerformanceEntry::success(name, json!("ok"), secs)
    }

    #[test]
    fn test_catalog_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        let records = vec![
            CapabilityRecord::new("demo.a", "first"),
            CapabilityRecord::new("demo.b", "second"),
            CapabilityRecord::new("demo.c", "third"),
        ];
        store.save_catalog(&records).unwrap();
        let loaded = store.load_catalog().unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_catalog_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        assert!(store.load_catalog().unwrap().is_empty());
    }

    #[test]
    fn test_catalog_version_mismatch_skipped() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        std::fs::write(
            dir.path().join("catalog.json"),
            r#"{"version":"0.9","records":[{"type":"capability","name":"x","description":"y"}]}"#,
        )
        .unwrap();
        // Mismatched version: ignored, never a crash, contributes nothing.
        assert!(store.load_catalog().unwrap().is_empty());
    }

    #[test]
    fn test_catalog_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        store.save_catalog(&[CapabilityRecord::new("a", "b")]).unwrap();
        assert!(dir.path().join("catalog.json").exists());
        assert!(!dir.path().join("catalog.json.tmp").exists());
    }

    #[test]
    fn test_catalog_rewrite_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        store.save_catalog(&[CapabilityRecord::new("a", "1")]).unwrap();
        store.save_catalog(&[CapabilityRecord::new("b", "2")]).unwrap();
        let loaded = store.load_catalog().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "b");
    }

    #[test]
    fn test_performance_concatenates_across_saves() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        store.save_performance(&[entry("demo.a", 0.1)]).unwrap();
        store
            .save_performance(&[entry("demo.b", 0.2), entry("demo.c", 0.3)])
            .unwrap();
        let loaded = store.load_performance().unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn test_performance_version_mismatch_skipped() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        store.save_performance(&[entry("demo.a", 0.1)]).unwrap();
        std::fs::write(
            dir.path().join("performance_incompatible.json"),
            r#"{"version":"2.0","performance_data":{"entries":[]}}"#,
        )
        .unwrap();
        let loaded = store.load_performance().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].capability_name, "demo.a");
    }

    #[test]
    fn test_performance_entry_fields_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        let mut failed = PerformanceEntry::failure("demo.bad", 1.5);
        failed.tokens_used = Some(250);
        store.save_performance(&[failed]).unwrap();

        let loaded = store.load_performance().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, ExecutionStatus::Failure);
        assert!(loaded[0].result.is_none());
        assert_eq!(loaded[0].tokens_used, Some(250));
        assert_eq!(loaded[0].category, "capability_execution");
    }

    #[test]
    fn test_latest_performance_returns_last_save() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        assert!(store.latest_performance().unwrap().is_none());
        store.save_performance(&[entry("demo.a", 0.1)]).unwrap();
        store.save_performance(&[entry("demo.b", 0.2)]).unwrap();
        let latest = store.latest_performance().unwrap().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].capability_name, "demo.b");
    }

    #[test]
    fn test_clean_old_data_keeps_recent_files() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path()).unwrap();
        store.save_performance(&[entry("demo.a", 0.1)]).unwrap();
        // Everything was just written — nothing is older than one day.
        assert_eq!(store.clean_old_data(1).unwrap(), 0);
        assert_eq!(store.load_performance().unwrap().len(), 1);
    }
}
