use anyhow::{Context, Result};
use scan_api::ApiOptions;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let d = ApiOptions::default();
        ApiConfig { base_url: d.base_url, timeout_ms: d.timeout_ms, user_agent: d.user_agent }
    }
}

impl ApiConfig {
    pub fn options(&self) -> ApiOptions {
        ApiOptions { base_url: self.base_url.clone(), timeout_ms: self.timeout_ms, user_agent: self.user_agent.clone() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
    pub auto_select: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig { poll_interval_ms: 5000, auto_select: true }
    }
}

impl WatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(scanview_core::poll::MIN_POLL_INTERVAL)
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub watch: WatchConfig,
    pub log_filter: Option<String>,
}

/// `Ok(None)` when no path was given and `./scanview.yaml` does not exist.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("scanview.yaml");
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(cfg))
}
