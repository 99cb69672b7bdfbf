//! Read-only view of a worker record for rule evaluation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Worker attributes keyed by dot path. Lookups try the literal flattened
/// key first, then walk nested objects segment by segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerAttributeSet {
    fields: Map<String, Value>,
}

impl WorkerAttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a worker document. Non-object documents yield an empty set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    /// Resolve an attribute path. Null counts as unresolved.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.fields.get(path) {
            return Some(v).filter(|v| !v.is_null());
        }
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                _ => return None,
            };
        }
        Some(current).filter(|v| !v.is_null())
    }
}

impl From<Value> for WorkerAttributeSet {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}
