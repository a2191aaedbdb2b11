//! Per-instance operation timeouts.
//!
//! A resource may carry a `timeouts` object whose fields override the
//! provider-wide default for individual operations:
//!
//! ```json
//! { "timeouts": { "create": "5m", "read": "30s" } }
//! ```

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::value::Attributes;

/// Reserved attribute name for the overrides.
pub const TIMEOUTS: &str = "timeouts";

/// Engine operations that run under a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Operation::ALL.into_iter().find(|op| op.as_str() == s)
    }
}

/// Overrides parsed from a resource's `timeouts` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeouts {
    create: Option<Duration>,
    read: Option<Duration>,
    update: Option<Duration>,
    delete: Option<Duration>,
}

impl Timeouts {
    /// Parse the overrides in `attrs`, accepting only operations in `supported`.
    pub fn parse(attrs: &Attributes, supported: &[Operation]) -> Result<Self, Diagnostics> {
        let mut timeouts = Timeouts::default();
        let Some(value) = attrs.get(TIMEOUTS) else {
            return Ok(timeouts);
        };

        let Value::Object(fields) = value else {
            return Err(Diagnostic::error(
                "Invalid timeouts",
                "timeouts must be an object of operation names to durations",
            )
            .at(TIMEOUTS)
            .into());
        };

        let mut diags = Diagnostics::new();
        for (key, raw) in fields {
            if raw.is_null() {
                continue;
            }
            let path = format!("{}.{}", TIMEOUTS, key);

            let Some(op) = Operation::parse(key).filter(|op| supported.contains(op)) else {
                diags.push(
                    Diagnostic::error(
                        "Unsupported timeout",
                        format!("this resource does not accept a \"{}\" timeout", key),
                    )
                    .at(path),
                );
                continue;
            };

            let parsed = raw
                .as_str()
                .ok_or_else(|| "must be a duration string such as \"10m\"".to_string())
                .and_then(|s| humantime::parse_duration(s).map_err(|e| e.to_string()));
            match parsed {
                Ok(d) => timeouts.set(op, d),
                Err(e) => diags.push(
                    Diagnostic::error("Invalid timeout", format!("{}: {}", key, e)).at(path),
                ),
            }
        }

        if diags.has_error() {
            Err(diags)
        } else {
            Ok(timeouts)
        }
    }

    fn set(&mut self, op: Operation, d: Duration) {
        match op {
            Operation::Create => self.create = Some(d),
            Operation::Read => self.read = Some(d),
            Operation::Update => self.update = Some(d),
            Operation::Delete => self.delete = Some(d),
        }
    }

    pub fn get(&self, op: Operation) -> Option<Duration> {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Timeout for `op`, falling back to `default`.
    pub fn resolve(&self, op: Operation, default: Duration) -> Duration {
        self.get(op).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CREATE_READ: &[Operation] = &[Operation::Create, Operation::Read];

    #[test]
    fn test_absent_uses_default() {
        let t = Timeouts::parse(&Attributes::new(), CREATE_READ).unwrap();
        assert_eq!(
            t.resolve(Operation::Create, Duration::from_secs(600)),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_parses_human_durations() {
        let attrs = Attributes::from([(TIMEOUTS, json!({"create": "5m", "read": "1m 30s"}))]);
        let t = Timeouts::parse(&attrs, CREATE_READ).unwrap();
        assert_eq!(t.get(Operation::Create), Some(Duration::from_secs(300)));
        assert_eq!(t.get(Operation::Read), Some(Duration::from_secs(90)));
        assert_eq!(t.get(Operation::Delete), None);
    }

    #[test]
    fn test_rejects_unsupported_operation() {
        let attrs = Attributes::from([(TIMEOUTS, json!({"delete": "5m"}))]);
        let diags = Timeouts::parse(&attrs, CREATE_READ).unwrap_err();
        let d = diags.errors().next().unwrap();
        assert_eq!(d.summary, "Unsupported timeout");
        assert_eq!(d.attribute.as_deref(), Some("timeouts.delete"));
    }

    #[test]
    fn test_rejects_bad_duration() {
        let attrs = Attributes::from([(TIMEOUTS, json!({"create": "soon", "read": 30}))]);
        let diags = Timeouts::parse(&attrs, CREATE_READ).unwrap_err();
        assert_eq!(diags.errors().count(), 2);
    }

    #[test]
    fn test_rejects_non_object() {
        let attrs = Attributes::from([(TIMEOUTS, json!("10m"))]);
        assert!(Timeouts::parse(&attrs, CREATE_READ).is_err());
    }
}
