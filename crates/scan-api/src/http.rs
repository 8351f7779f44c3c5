use crate::{ApiError, ApiResult, CaseSummary, ScanApi};
use async_trait::async_trait;
use reqwest::Client;
use scanview_core::{records_from_value, AnalysisRecord, CaseId, StatusEntry};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ApiOptions {
    fn default() -> Self {
        ApiOptions {
            base_url: "http://localhost:5001".to_string(),
            timeout_ms: 10_000,
            user_agent: format!("scanview/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiOptions {
    pub fn with_base(base_url: &str) -> Self {
        ApiOptions { base_url: base_url.to_string(), ..Default::default() }
    }
}

#[derive(Deserialize)]
struct ModuleList {
    #[serde(default)]
    modules: Vec<String>,
}

pub struct HttpScanApi {
    base: Url,
    client: Client,
}

impl HttpScanApi {
    pub fn new(opts: &ApiOptions) -> ApiResult<Self> {
        let base = Url::parse(&opts.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(opts.timeout_ms))
            .user_agent(opts.user_agent.clone())
            .gzip(true)
            .build()?;
        Ok(HttpScanApi { base, client })
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), url: url.to_string() });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ScanApi for HttpScanApi {
    async fn list_cases(&self) -> ApiResult<Vec<CaseSummary>> {
        self.get_json(self.endpoint(&["scans"])?).await
    }

    async fn case_status(&self, case: &CaseId) -> ApiResult<CaseSummary> {
        self.get_json(self.endpoint(&["status", case.as_str()])?).await
    }

    async fn module_statuses(&self, case: &CaseId) -> ApiResult<Vec<StatusEntry>> {
        self.get_json(self.endpoint(&["scan", case.as_str(), "modules"])?).await
    }

    async fn available_modules(&self, case: &CaseId) -> ApiResult<Vec<String>> {
        let list: ModuleList = self.get_json(self.endpoint(&["results", case.as_str(), "modules"])?).await?;
        Ok(list.modules)
    }

    async fn module_results(&self, case: &CaseId, module: &str) -> ApiResult<Vec<AnalysisRecord>> {
        let mut url = self.endpoint(&["results", case.as_str()])?;
        url.query_pairs_mut().append_pair("module", module);
        let value: serde_json::Value = self.get_json(url).await?;
        Ok(records_from_value(value))
    }

    async fn health(&self) -> bool {
        let Ok(url) = self.endpoint(&["health"]) else { return false };
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use scanview_core::{CaseStatus, ModuleStatus};

    fn api(server: &mockito::Server) -> HttpScanApi {
        HttpScanApi::new(&ApiOptions::with_base(&server.url())).unwrap()
    }

    #[tokio::test]
    async fn decodes_module_status_rows() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/scan/abc/modules")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"module":"windows.pslist","status":"RUNNING"},{"module":"windows.netscan","status":"FAILED","error_message":"boom"}]"#)
            .create_async()
            .await;
        let rows = api(&server).module_statuses(&"abc".into()).await.unwrap();
        m.assert_async().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, ModuleStatus::Running);
        assert_eq!(rows[1].error_detail.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn module_list_unwraps_envelope() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/results/abc/modules")
            .with_status(200)
            .with_body(r#"{"modules":["windows.pslist","windows.netscan"]}"#)
            .create_async()
            .await;
        let mods = api(&server).available_modules(&"abc".into()).await.unwrap();
        assert_eq!(mods, vec!["windows.pslist", "windows.netscan"]);
    }

    #[tokio::test]
    async fn results_accept_single_object() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/results/abc")
            .match_query(Matcher::UrlEncoded("module".into(), "windows.info".into()))
            .with_status(200)
            .with_body(r#"{"Kernel Base":"0xf80000000000"}"#)
            .create_async()
            .await;
        let recs = api(&server).module_results(&"abc".into(), "windows.info").await.unwrap();
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains_key("Kernel Base"));
    }

    #[tokio::test]
    async fn non_success_maps_to_status_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/scans").with_status(503).create_async().await;
        let err = api(&server).list_cases().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn case_status_and_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/abc")
            .with_status(200)
            .with_body(r#"{"uuid":"abc","status":"completed","name":"lab"}"#)
            .create_async()
            .await;
        server.mock("GET", "/health").with_status(200).with_body(r#"{"status":"ok"}"#).create_async().await;
        let api = api(&server);
        let c = api.case_status(&"abc".into()).await.unwrap();
        assert_eq!(c.status, CaseStatus::Completed);
        assert!(api.health().await);
    }

    #[test]
    fn endpoint_keeps_base_path_and_escapes_segments() {
        let api = HttpScanApi::new(&ApiOptions::with_base("http://h:1/api/")).unwrap();
        let url = api.endpoint(&["results", "a b"]).unwrap();
        assert_eq!(url.as_str(), "http://h:1/api/results/a%20b");
    }
}
