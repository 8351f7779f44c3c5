use serde::{Deserialize, Deserializer, Serialize};

/// Per-module lifecycle as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ModuleStatus {
    /// Normalize free-form status text. Unknown text maps to `Pending`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" | "started" | "in_progress" => ModuleStatus::Running,
            "completed" | "complete" | "done" | "success" => ModuleStatus::Completed,
            "failed" | "error" | "failure" => ModuleStatus::Failed,
            _ => ModuleStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleStatus::Completed | ModuleStatus::Failed)
    }
}

impl<'de> Deserialize<'de> for ModuleStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        Ok(ModuleStatus::parse(s.as_deref().unwrap_or_default()))
    }
}

/// One row of the module-status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub module: String,
    pub status: ModuleStatus,
    #[serde(rename = "error_message", alias = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl StatusEntry {
    pub fn new(module: &str, status: ModuleStatus) -> Self {
        StatusEntry { module: module.to_string(), status, error_detail: None }
    }

    pub fn failed(module: &str, error: &str) -> Self {
        StatusEntry { module: module.to_string(), status: ModuleStatus::Failed, error_detail: Some(error.to_string()) }
    }
}

/// Whole-case (scan) status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl CaseStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => CaseStatus::Running,
            "completed" => CaseStatus::Completed,
            "failed" => CaseStatus::Failed,
            _ => CaseStatus::Pending,
        }
    }

    /// Pending and running cases may still produce new module output.
    pub fn is_active(self) -> bool {
        matches!(self, CaseStatus::Pending | CaseStatus::Running)
    }
}

impl<'de> Deserialize<'de> for CaseStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        Ok(CaseStatus::parse(s.as_deref().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_is_case_insensitive() {
        assert_eq!(ModuleStatus::parse("COMPLETED"), ModuleStatus::Completed);
        assert_eq!(ModuleStatus::parse(" running "), ModuleStatus::Running);
        assert_eq!(ModuleStatus::parse("error"), ModuleStatus::Failed);
        assert_eq!(ModuleStatus::parse("whatever"), ModuleStatus::Pending);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(ModuleStatus::Completed.is_terminal());
        assert!(ModuleStatus::Failed.is_terminal());
        assert!(!ModuleStatus::Running.is_terminal());
        assert!(!ModuleStatus::Pending.is_terminal());
    }

    #[test]
    fn entry_decodes_wire_shape() {
        let e: StatusEntry = serde_json::from_str(
            r#"{"module":"windows.pslist","status":"FAILED","error_message":"boom"}"#,
        ).unwrap();
        assert_eq!(e, StatusEntry::failed("windows.pslist", "boom"));

        let e: StatusEntry = serde_json::from_str(r#"{"module":"m","status":null}"#).unwrap();
        assert_eq!(e.status, ModuleStatus::Pending);
        assert_eq!(e.error_detail, None);
    }

    #[test]
    fn active_cases() {
        assert!(CaseStatus::parse("pending").is_active());
        assert!(CaseStatus::parse("running").is_active());
        assert!(!CaseStatus::parse("completed").is_active());
        assert!(!CaseStatus::parse("failed").is_active());
    }
}
