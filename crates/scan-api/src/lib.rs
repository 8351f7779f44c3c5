//! Polling endpoints of the scan backend.
//!
//! [`ScanApi`] is the seam the reconcilers poll through; [`HttpScanApi`] talks
//! to the real backend and [`MemoryScanApi`] replays scripted snapshots.

mod http;
mod memory;

pub use http::{ApiOptions, HttpScanApi};
pub use memory::MemoryScanApi;

use async_trait::async_trait;
use scanview_core::{AnalysisRecord, CaseId, CaseStatus, StatusEntry};
use serde::{Deserialize, Serialize};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} from {url}")]
    Status { status: u16, url: String },

    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// One case (scan) as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: CaseStatus,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CaseSummary {
    pub fn new(uuid: &str, status: CaseStatus) -> Self {
        CaseSummary { uuid: uuid.to_string(), name: None, status, mode: None, created_at: None, error: None }
    }

    pub fn id(&self) -> CaseId {
        CaseId(self.uuid.clone())
    }

    pub fn display_name(&self) -> String {
        match self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(n) => n.to_string(),
            None => format!("Scan {}", self.uuid.chars().take(8).collect::<String>()),
        }
    }
}

#[async_trait]
pub trait ScanApi: Send + Sync {
    async fn list_cases(&self) -> ApiResult<Vec<CaseSummary>>;

    async fn case_status(&self, case: &CaseId) -> ApiResult<CaseSummary>;

    /// `{module, status, error_message?}` rows for one case.
    async fn module_statuses(&self, case: &CaseId) -> ApiResult<Vec<StatusEntry>>;

    /// Names of modules that currently have output for the case.
    async fn available_modules(&self, case: &CaseId) -> ApiResult<Vec<String>>;

    async fn module_results(&self, case: &CaseId, module: &str) -> ApiResult<Vec<AnalysisRecord>>;

    async fn health(&self) -> bool;
}
