use crate::{ApiError, ApiResult, CaseSummary, ScanApi};
use async_trait::async_trait;
use scanview_core::{AnalysisRecord, CaseId, StatusEntry};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Scripted replies: each call consumes the front entry until one is left,
/// which then repeats. `None` replies fail with HTTP 503.
struct Script<T> {
    replies: VecDeque<Option<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self { Script { replies: VecDeque::new() } }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<Option<T>> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

#[derive(Default)]
struct Inner {
    cases: Vec<CaseSummary>,
    statuses: HashMap<CaseId, Script<Vec<StatusEntry>>>,
    modules: HashMap<CaseId, Script<Vec<String>>>,
    results: HashMap<(CaseId, String), Vec<AnalysisRecord>>,
    calls: HashMap<&'static str, usize>,
    healthy: bool,
}

/// In-process backend replaying scripted snapshots.
#[derive(Default)]
pub struct MemoryScanApi {
    inner: Mutex<Inner>,
}

fn unavailable(what: &str) -> ApiError {
    ApiError::Status { status: 503, url: format!("memory://{}", what) }
}

impl MemoryScanApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.lock().healthy = true;
        api
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_cases(&self, cases: Vec<CaseSummary>) {
        self.lock().cases = cases;
    }

    pub fn push_statuses(&self, case: &CaseId, rows: Vec<StatusEntry>) {
        self.lock().statuses.entry(case.clone()).or_default().replies.push_back(Some(rows));
    }

    pub fn fail_statuses(&self, case: &CaseId) {
        self.lock().statuses.entry(case.clone()).or_default().replies.push_back(None);
    }

    pub fn push_modules(&self, case: &CaseId, names: &[&str]) {
        let names = names.iter().map(|s| s.to_string()).collect();
        self.lock().modules.entry(case.clone()).or_default().replies.push_back(Some(names));
    }

    pub fn fail_modules(&self, case: &CaseId) {
        self.lock().modules.entry(case.clone()).or_default().replies.push_back(None);
    }

    pub fn set_results(&self, case: &CaseId, module: &str, records: Vec<AnalysisRecord>) {
        self.lock().results.insert((case.clone(), module.to_string()), records);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }

    /// How many times an endpoint was hit (`"statuses"`, `"modules"`, `"results"`, ...).
    pub fn calls(&self, endpoint: &str) -> usize {
        self.lock().calls.get(endpoint).copied().unwrap_or(0)
    }

    fn hit(inner: &mut Inner, endpoint: &'static str) {
        *inner.calls.entry(endpoint).or_insert(0) += 1;
    }
}

#[async_trait]
impl ScanApi for MemoryScanApi {
    async fn list_cases(&self) -> ApiResult<Vec<CaseSummary>> {
        let mut inner = self.lock();
        Self::hit(&mut inner, "cases");
        Ok(inner.cases.clone())
    }

    async fn case_status(&self, case: &CaseId) -> ApiResult<CaseSummary> {
        let mut inner = self.lock();
        Self::hit(&mut inner, "case");
        inner
            .cases
            .iter()
            .find(|c| c.uuid == case.0)
            .cloned()
            .ok_or_else(|| ApiError::Status { status: 404, url: format!("memory://status/{}", case) })
    }

    async fn module_statuses(&self, case: &CaseId) -> ApiResult<Vec<StatusEntry>> {
        let mut inner = self.lock();
        Self::hit(&mut inner, "statuses");
        match inner.statuses.get_mut(case).and_then(Script::next) {
            Some(Some(rows)) => Ok(rows),
            Some(None) => Err(unavailable("statuses")),
            None => Ok(Vec::new()),
        }
    }

    async fn available_modules(&self, case: &CaseId) -> ApiResult<Vec<String>> {
        let mut inner = self.lock();
        Self::hit(&mut inner, "modules");
        match inner.modules.get_mut(case).and_then(Script::next) {
            Some(Some(names)) => Ok(names),
            Some(None) => Err(unavailable("modules")),
            None => Ok(Vec::new()),
        }
    }

    async fn module_results(&self, case: &CaseId, module: &str) -> ApiResult<Vec<AnalysisRecord>> {
        let mut inner = self.lock();
        Self::hit(&mut inner, "results");
        Ok(inner.results.get(&(case.clone(), module.to_string())).cloned().unwrap_or_default())
    }

    async fn health(&self) -> bool {
        self.lock().healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanview_core::ModuleStatus;

    #[tokio::test]
    async fn scripts_advance_then_repeat_last() {
        let api = MemoryScanApi::new();
        let case = CaseId::from("c1");
        api.push_statuses(&case, vec![StatusEntry::new("m", ModuleStatus::Pending)]);
        api.fail_statuses(&case);
        api.push_statuses(&case, vec![StatusEntry::new("m", ModuleStatus::Completed)]);

        assert_eq!(api.module_statuses(&case).await.unwrap()[0].status, ModuleStatus::Pending);
        assert!(api.module_statuses(&case).await.is_err());
        assert_eq!(api.module_statuses(&case).await.unwrap()[0].status, ModuleStatus::Completed);
        assert_eq!(api.module_statuses(&case).await.unwrap()[0].status, ModuleStatus::Completed);
        assert_eq!(api.calls("statuses"), 4);
    }

    #[tokio::test]
    async fn unknown_case_has_no_modules() {
        let api = MemoryScanApi::new();
        assert!(api.available_modules(&"nope".into()).await.unwrap().is_empty());
        assert!(api.case_status(&"nope".into()).await.is_err());
        assert!(api.health().await);
    }
}
