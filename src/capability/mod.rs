//! # Capability domain types
//!
//! ## Responsibility
//! Define what a capability *is*: a named, independently invocable unit of
//! work. Units declare their capabilities in a static [`UnitManifest`]
//! rather than being discovered by runtime reflection, so dropping a unit
//! into the loader is enough to make its capabilities available.
//!
//! ## Guarantees
//! - Handles are cheap to clone and safe to invoke from any thread
//! - A capability is never mutated in place: replace = remove + add
//! - Every error carries the capability or unit name it refers to
//!
//! ## NOT Responsible For
//! - Name qualification and lookup (that belongs to `loader`)
//! - The authoritative catalog and persistence (that belongs to `registry`)

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub mod basic;
pub mod loader;
pub mod registry;

use crate::persistence::PersistenceError;

// ── Errors ────────────────────────────────────────────────────────────────

/// Error type a capability invocation may fail with.
///
/// Capabilities are trusted local code; they report failures as ordinary
/// boxed errors which the runner wraps with the capability name.
pub type CapabilityFailure = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the capability subsystem (loader and registry).
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A capability name was empty or whitespace-only.
    #[error("capability name must be a non-empty string")]
    EmptyName,

    /// A capability with the same name is already registered.
    #[error("capability '{0}' already exists")]
    AlreadyExists(String),

    /// The requested capability was not found.
    #[error("capability '{0}' not found")]
    NotFound(String),

    /// A unit manifest failed validation during load. The whole load is
    /// aborted — the runner never starts with a partial capability set.
    #[error("failed to load capability unit '{unit}': {reason}")]
    Load {
        /// Name of the offending unit.
        unit: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The capability's own code failed during invocation.
    #[error("capability '{name}' failed during execution")]
    Execution {
        /// Name of the capability that failed.
        name: String,
        /// The underlying failure, chained so callers can diagnose it.
        #[source]
        source: CapabilityFailure,
    },

    /// The capability catalog could not be persisted or reloaded.
    #[error("capability catalog persistence failed")]
    Persistence(#[source] PersistenceError),
}

// ── Handle ────────────────────────────────────────────────────────────────

/// The callable shape of a capability: positional JSON arguments in, a JSON
/// result or a failure out.
pub type CapabilityFn = dyn Fn(&[Value]) -> Result<Value, CapabilityFailure> + Send + Sync;

/// Shared, cheaply-cloneable handle to an invocable capability.
#[derive(Clone)]
pub struct CapabilityHandle(Arc<CapabilityFn>);

impl CapabilityHandle {
    /// Wrap a function as a capability handle.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CapabilityFailure> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the capability with positional arguments.
    ///
    /// # Errors
    ///
    /// Propagates whatever failure the capability itself reports.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, CapabilityFailure> {
        (self.0)(args)
    }
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityHandle").finish_non_exhaustive()
    }
}

// ── Catalog entry ─────────────────────────────────────────────────────────

/// A registered capability: its description plus the live handle.
///
/// Owned exclusively by the registry. The handle is never persisted — it is
/// re-resolved from the loader at startup.
#[derive(Debug, Clone)]
pub struct Capability {
    /// Human-readable description of what the capability does.
    pub description: String,
    /// The invocable handle.
    pub handle: CapabilityHandle,
}

// ── Unit manifests ────────────────────────────────────────────────────────

/// One capability declared by a unit: the unqualified symbol name, a
/// description, and the function itself.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Unqualified symbol name; registered as `"<unit>.<symbol>"`.
    pub symbol: String,
    /// Description carried into the catalog listing.
    pub description: String,
    /// The invocable handle.
    pub handle: CapabilityHandle,
}

/// Static declaration of the capabilities a unit provides.
///
/// This replaces reflective symbol discovery: a unit is any value that can
/// produce one of these, typically via a `unit()` constructor.
///
/// # Example
///
/// ```rust
/// use tokio_capability_runner::capability::UnitManifest;
/// use serde_json::json;
///
/// let unit = UnitManifest::new("math")
///     .entry("double", "Double the first argument", |args| {
///         let n = args.first().and_then(|v| v.as_f64()).unwrap_or(0.0);
///         Ok(json!(n * 2.0))
///     });
/// assert_eq!(unit.entries.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct UnitManifest {
    /// Unit name; the prefix of every qualified capability name.
    pub unit: String,
    /// Capabilities the unit declares.
    pub entries: Vec<ManifestEntry>,
}

impl UnitManifest {
    /// Create an empty manifest for the named unit.
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            entries: Vec::new(),
        }
    }

    /// Declare a capability on this unit (builder style).
    pub fn entry<F>(mut self, symbol: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CapabilityFailure> + Send + Sync + 'static,
    {
        self.entries.push(ManifestEntry {
            symbol: symbol.into(),
            description: description.into(),
            handle: CapabilityHandle::new(f),
        });
        self
    }
}
