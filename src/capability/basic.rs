//! Built-in basic capability unit.
//!
//! Ships a handful of small capabilities used by the demo binary and the
//! test suite: a greeting, simple arithmetic, a clock, and a capability
//! that always fails (for exercising failure recording).

use chrono::Utc;
use serde_json::{json, Value};

use super::{CapabilityFailure, UnitManifest};

/// Name of the built-in unit; capabilities register as `"basic.<symbol>"`.
pub const UNIT_NAME: &str = "basic";

fn arg_f64(args: &[Value], index: usize) -> Result<f64, CapabilityFailure> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("argument {index} must be a number").into())
}

/// The built-in unit manifest.
pub fn unit() -> UnitManifest {
    UnitManifest::new(UNIT_NAME)
        .entry("greet", "Greet the given name, or the world", |args| {
            let who = args.first().and_then(Value::as_str).unwrap_or("world");
            Ok(json!(format!("Hello, {who}!")))
        })
        .entry("add_numbers", "Add the first two numeric arguments", |args| {
            let a = arg_f64(args, 0)?;
            let b = arg_f64(args, 1)?;
            Ok(json!(a + b))
        })
        .entry("current_time", "Current UTC time, RFC 3339", |_args| {
            Ok(json!(Utc::now().to_rfc3339()))
        })
        .entry("simulate_failure", "Always fails; exercises failure recording", |_args| {
            Err("simulated capability failure".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::loader::CapabilityLoader;

    fn loader() -> CapabilityLoader {
        CapabilityLoader::load(vec![unit()]).unwrap()
    }

    #[test]
    fn test_greet_defaults_to_world() {
        assert_eq!(loader().execute("basic.greet", &[]).unwrap(), json!("Hello, world!"));
    }

    #[test]
    fn test_greet_uses_first_argument() {
        let out = loader().execute("basic.greet", &[json!("runner")]).unwrap();
        assert_eq!(out, json!("Hello, runner!"));
    }

    #[test]
    fn test_add_numbers() {
        let out = loader()
            .execute("basic.add_numbers", &[json!(2.0), json!(40.0)])
            .unwrap();
        assert_eq!(out, json!(42.0));
    }

    #[test]
    fn test_add_numbers_rejects_missing_args() {
        assert!(loader().execute("basic.add_numbers", &[json!(1.0)]).is_err());
    }

    #[test]
    fn test_current_time_is_rfc3339() {
        let out = loader().execute("basic.current_time", &[]).unwrap();
        let s = out.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(s).is_ok());
    }

    #[test]
    fn test_simulate_failure_always_fails() {
        assert!(loader().execute("basic.simulate_failure", &[]).is_err());
    }
}
