//! Core types shared by the result builders and the live-state reconcilers.

pub mod normalize;
pub mod poll;
pub mod status;
pub mod tree;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub use normalize::FieldPurpose;
pub use status::{CaseStatus, ModuleStatus, StatusEntry};
pub use tree::{forest_count, NodeIds, TreeNode};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// One row of analysis-module output. No fixed schema.
pub type AnalysisRecord = Map<String, Value>;

/// Case (scan) identifier as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CaseId {
    fn from(s: &str) -> Self {
        CaseId(s.to_string())
    }
}

impl From<String> for CaseId {
    fn from(s: String) -> Self {
        CaseId(s)
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coerce a results payload into records: arrays keep their object rows,
/// a single object becomes one record, anything else yields nothing.
pub fn records_from_value(value: Value) -> Vec<AnalysisRecord> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(m) => Some(m),
                _ => None,
            })
            .collect(),
        Value::Object(m) => vec![m],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn array_payload_keeps_object_rows_only() {
        let recs = records_from_value(json!([{"PID": 4}, 7, {"PID": 8}]));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1]["PID"], json!(8));
    }

    #[test]
    fn single_object_payload_is_one_record() {
        let recs = records_from_value(json!({"Path": "C:\\x"}));
        assert_eq!(recs.len(), 1);
        assert!(records_from_value(Value::Null).is_empty());
    }

    #[test]
    fn case_id_displays_raw() {
        let id: CaseId = "abc-123".into();
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");
    }
}
