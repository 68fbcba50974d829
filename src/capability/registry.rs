//! # Capability Registry
//!
//! ## Responsibility
//! Own the authoritative catalog of registered capabilities (name →
//! description + handle), backed by a persisted snapshot. Name resolution
//! and invocation are delegated to the [`CapabilityLoader`].
//!
//! ## Guarantees
//! - Thread-safe: all operations go through `Arc<Mutex<Inner>>`; clones
//!   share state
//! - Transactional add: either both the catalog update and its persistence
//!   succeed, or the add is rejected and nothing changes
//! - Insertion-order iteration: `list()` drives the execution cycle in the
//!   order capabilities were registered
//! - Absence on `remove` is a normal outcome (bool), not an error
//!
//! ## NOT Responsible For
//! - Executing cycles or recording performance (that belongs to `engine`)
//! - Snapshot file formats (that belongs to `persistence`)

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::persistence::{CapabilityRecord, DataStore};

use super::{loader::CapabilityLoader, Capability, CapabilityError};

struct Inner {
    loader: CapabilityLoader,
    catalog: IndexMap<String, Capability>,
    store: Arc<DataStore>,
}

/// Authoritative catalog of registered capabilities.
///
/// Cheap to clone — all clones share the same inner state.
#[derive(Clone)]
pub struct CapabilityRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl CapabilityRegistry {
    /// Construct the registry, reloading previously persisted catalog
    /// entries and re-binding each to a live handle via the loader.
    ///
    /// A persisted record whose handle can no longer be resolved (unit
    /// missing or renamed) is skipped with a warning — capabilities are
    /// never silently dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Persistence`] if the persisted catalog
    /// cannot be read at all.
    pub fn new(loader: CapabilityLoader, store: Arc<DataStore>) -> Result<Self, CapabilityError> {
        let records = store.load_catalog().map_err(CapabilityError::Persistence)?;

        let mut catalog = IndexMap::new();
        for record in records {
            match loader.get(&record.name) {
                Ok(handle) => {
                    catalog.insert(
                        record.name,
                        Capability {
                            description: record.description,
                            handle: handle.clone(),
                        },
                    );
                }
                Err(_) => {
                    warn!(
                        capability = %record.name,
                        "persisted capability no longer resolvable, skipping"
                    );
                }
            }
        }

        info!(count = catalog.len(), "capability registry initialized");
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                loader,
                catalog,
                store,
            })),
        })
    }

    /// Register a capability under `name` with the given description.
    ///
    /// The underlying handle is resolved via the loader, the catalog is
    /// updated, and the updated catalog is persisted — as one transaction.
    /// If persistence fails the in-memory insert is rolled back.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::EmptyName`] for an empty or whitespace name.
    /// - [`CapabilityError::AlreadyExists`] if the name is registered.
    /// - [`CapabilityError::NotFound`] if the loader cannot resolve it.
    /// - [`CapabilityError::Persistence`] if saving the catalog fails.
    pub fn add(&self, name: &str, description: &str) -> Result<(), CapabilityError> {
        if name.trim().is_empty() {
            return Err(CapabilityError::EmptyName);
        }

        let mut inner = self.inner.lock();
        if inner.catalog.contains_key(name) {
            return Err(CapabilityError::AlreadyExists(name.to_string()));
        }

        let handle = inner.loader.get(name)?.clone();
        inner.catalog.insert(
            name.to_string(),
            Capability {
                description: description.to_string(),
                handle,
            },
        );

        if let Err(e) = Self::persist(&inner) {
            inner.catalog.shift_remove(name);
            return Err(CapabilityError::Persistence(e));
        }

        info!(capability = name, "added capability");
        Ok(())
    }

    /// Retrieve a registered capability (description + handle).
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::NotFound`] if the name is not registered.
    pub fn get(&self, name: &str) -> Result<Capability, CapabilityError> {
        self.inner
            .lock()
            .catalog
            .get(name)
            .cloned()
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))
    }

    /// Snapshot of the catalog as name → description, in insertion order.
    ///
    /// Never fails; an empty registry yields an empty map.
    pub fn list(&self) -> IndexMap<String, String> {
        let inner = self.inner.lock();
        inner
            .catalog
            .iter()
            .map(|(name, cap)| (name.clone(), cap.description.clone()))
            .collect()
    }

    /// Remove a capability if present and re-persist the catalog.
    ///
    /// Returns `true` if the capability was removed, `false` if it was not
    /// registered — absence is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Persistence`] if re-persisting fails; the
    /// in-memory removal is rolled back.
    pub fn remove(&self, name: &str) -> Result<bool, CapabilityError> {
        let mut inner = self.inner.lock();
        let Some(removed) = inner.catalog.shift_remove(name) else {
            info!(capability = name, "attempted to remove unknown capability");
            return Ok(false);
        };

        if let Err(e) = Self::persist(&inner) {
            inner.catalog.insert(name.to_string(), removed);
            return Err(CapabilityError::Persistence(e));
        }

        info!(capability = name, "removed capability");
        Ok(true)
    }

    /// Resolve and invoke a registered capability.
    ///
    /// The catalog lock is released before invocation, so a capability may
    /// itself call back into the registry.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::NotFound`] if the name is not registered.
    /// - [`CapabilityError::Execution`] wrapping the invocation's failure
    ///   with the original cause chained, never masked.
    pub fn execute(&self, name: &str, args: &[Value]) -> Result<Value, CapabilityError> {
        let handle = {
            let inner = self.inner.lock();
            inner
                .catalog
                .get(name)
                .map(|cap| cap.handle.clone())
                .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?
        };

        debug!(capability = name, "executing capability");
        handle
            .invoke(args)
            .map_err(|source| CapabilityError::Execution {
                name: name.to_string(),
                source,
            })
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.inner.lock().catalog.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().catalog.is_empty()
    }

    fn persist(inner: &Inner) -> Result<(), crate::persistence::PersistenceError> {
        let records: Vec<CapabilityRecord> = inner
            .catalog
            .iter()
            .map(|(name, cap)| CapabilityRecord::new(name, &cap.description))
            .collect();
        inner.store.save_catalog(&records)
    }
}
