//! # Capability Loader
//!
//! ## Responsibility
//! Turn a collection of unit manifests into a flat mapping of qualified
//! capability names (`"<unit>.<symbol>"`) to invocable handles. Qualifying
//! names by unit prevents symbol collisions across units and keeps the
//! catalog stable under reloading.
//!
//! ## Guarantees
//! - Fail-fast: a malformed unit aborts the whole load — the runner never
//!   starts with a partially-initialised capability set
//! - Symbols with a leading underscore are private by convention and are
//!   skipped, never exposed
//! - `execute` surfaces the underlying invocation failure, chained, never
//!   swallowed
//!
//! ## NOT Responsible For
//! - The authoritative catalog or persistence (that belongs to `registry`)
//! - Deciding which capabilities actually run each cycle

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use super::{CapabilityError, CapabilityHandle, UnitManifest};

/// A capability as loaded from a unit manifest.
#[derive(Debug, Clone)]
struct LoadedCapability {
    description: String,
    handle: CapabilityHandle,
}

/// Loads unit manifests and resolves qualified capability names to handles.
#[derive(Debug)]
pub struct CapabilityLoader {
    capabilities: HashMap<String, LoadedCapability>,
}

impl CapabilityLoader {
    /// Load every unit manifest, validating each one.
    ///
    /// Accepted symbols are registered under `"<unit>.<symbol>"`. Symbols
    /// starting with `_` are reserved/private and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Load`] — aborting the whole load — when a
    /// unit name is empty, a symbol name is empty, the same unit name
    /// appears twice, or two entries resolve to the same qualified name.
    pub fn load(units: Vec<UnitManifest>) -> Result<Self, CapabilityError> {
        let mut capabilities: HashMap<String, LoadedCapability> = HashMap::new();
        let mut seen_units: Vec<String> = Vec::new();

        for manifest in units {
            let UnitManifest { unit, entries } = manifest;

            if unit.trim().is_empty() {
                return Err(CapabilityError::Load {
                    unit,
                    reason: "unit name must be non-empty".to_string(),
                });
            }
            if seen_units.contains(&unit) {
                return Err(CapabilityError::Load {
                    unit,
                    reason: "unit declared more than once".to_string(),
                });
            }
            seen_units.push(unit.clone());

            for entry in entries {
                if entry.symbol.trim().is_empty() {
                    return Err(CapabilityError::Load {
                        unit,
                        reason: "symbol name must be non-empty".to_string(),
                    });
                }
                if entry.symbol.starts_with('_') {
                    debug!(unit = %unit, symbol = %entry.symbol, "skipping private symbol");
                    continue;
                }

                let qualified = format!("{}.{}", unit, entry.symbol);
                if capabilities.contains_key(&qualified) {
                    return Err(CapabilityError::Load {
                        unit,
                        reason: format!("duplicate capability name '{qualified}'"),
                    });
                }
                capabilities.insert(
                    qualified,
                    LoadedCapability {
                        description: entry.description,
                        handle: entry.handle,
                    },
                );
            }
            debug!(unit = %unit, "loaded unit");
        }

        info!(count = capabilities.len(), "capabilities loaded");
        Ok(Self { capabilities })
    }

    /// Resolve a qualified capability name to its handle.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::NotFound`] for an unknown name.
    pub fn get(&self, name: &str) -> Result<&CapabilityHandle, CapabilityError> {
        self.capabilities
            .get(name)
            .map(|c| &c.handle)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))
    }

    /// Description declared for a qualified name, if loaded.
    pub fn description(&self, name: &str) -> Option<&str> {
        self.capabilities.get(name).map(|c| c.description.as_str())
    }

    /// Whether the loader resolved the given qualified name.
    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// All qualified names the loader resolved, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    /// Number of loaded capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether no capabilities were loaded.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Resolve and invoke a capability directly.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::NotFound`] for an unknown name.
    /// - [`CapabilityError::Execution`] wrapping the invocation's own
    ///   failure, with the cause chained.
    pub fn execute(&self, name: &str, args: &[Value]) -> Result<Value, CapabilityError> {
        let handle = self.get(name)?;
        handle
            .invoke(args)
            .map_err(|source| CapabilityError::Execution {
                name: name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::UnitManifest;
    use serde_json::json;

    fn math_unit() -> UnitManifest {
        UnitManifest::new("math")
            .entry("double", "double a number", |args| {
                let n = args.first().and_then(|v| v.as_f64()).unwrap_or(0.0);
                Ok(json!(n * 2.0))
            })
            .entry("_internal", "private helper", |_| Ok(json!(null)))
    }

    #[test]
    fn test_load_qualifies_names_by_unit() {
        let loader = CapabilityLoader::load(vec![math_unit()]).unwrap();
        assert!(loader.contains("math.double"));
        assert!(!loader.contains("double"));
    }

    #[test]
    fn test_load_skips_private_symbols() {
        let loader = CapabilityLoader::load(vec![math_unit()]).unwrap();
        assert!(!loader.contains("math._internal"));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn test_load_rejects_empty_unit_name() {
        let err = CapabilityLoader::load(vec![UnitManifest::new("  ")]).unwrap_err();
        assert!(matches!(err, CapabilityError::Load { .. }));
    }

    #[test]
    fn test_load_rejects_empty_symbol() {
        let unit = UnitManifest::new("u").entry("", "no name", |_| Ok(json!(null)));
        let err = CapabilityLoader::load(vec![unit]).unwrap_err();
        assert!(matches!(err, CapabilityError::Load { .. }));
    }

    #[test]
    fn test_load_rejects_duplicate_qualified_name() {
        let unit = UnitManifest::new("u")
            .entry("f", "first", |_| Ok(json!(1)))
            .entry("f", "second", |_| Ok(json!(2)));
        let err = CapabilityLoader::load(vec![unit]).unwrap_err();
        assert!(err.to_string().contains("u.f"));
    }

    #[test]
    fn test_load_rejects_duplicate_unit() {
        let err =
            CapabilityLoader::load(vec![UnitManifest::new("u"), UnitManifest::new("u")]).unwrap_err();
        assert!(matches!(err, CapabilityError::Load { .. }));
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        // Second unit is malformed — nothing from the first survives either,
        // because load returns Err and no loader is constructed.
        let units = vec![math_unit(), UnitManifest::new("")];
        assert!(CapabilityLoader::load(units).is_err());
    }

    #[test]
    fn test_get_unknown_name_is_not_found() {
        let loader = CapabilityLoader::load(vec![math_unit()]).unwrap();
        let err = loader.get("math.missing").unwrap_err();
        assert!(matches!(err, CapabilityError::NotFound(_)));
    }

    #[test]
    fn test_execute_invokes_with_args() {
        let loader = CapabilityLoader::load(vec![math_unit()]).unwrap();
        let out = loader.execute("math.double", &[json!(21.0)]).unwrap();
        assert_eq!(out, json!(42.0));
    }

    #[test]
    fn test_execute_surfaces_underlying_failure() {
        let unit = UnitManifest::new("u").entry("bad", "always fails", |_| Err("kaput".into()));
        let loader = CapabilityLoader::load(vec![unit]).unwrap();
        let err = loader.execute("u.bad", &[]).unwrap_err();
        match err {
            CapabilityError::Execution { name, source } => {
                assert_eq!(name, "u.bad");
                assert_eq!(source.to_string(), "kaput");
            }
            other => panic!("expected Execution error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_load_is_valid() {
        let loader = CapabilityLoader::load(Vec::new()).unwrap();
        assert!(loader.is_empty());
    }

    #[test]
    fn test_description_exposed() {
        let loader = CapabilityLoader::load(vec![math_unit()]).unwrap();
        assert_eq!(loader.description("math.double"), Some("double a number"));
        assert_eq!(loader.description("math.missing"), None);
    }
}
