// SPDX-License-Identifier: MIT
//! Cloud malware-scan client.
//!
//! Thin HTTPS client over the file-security scan API: upload the bytes, get
//! a JSON verdict back. Verdict interpretation lives in `verdict_is_malicious`
//! so the upload service can map it to the numeric result-code convention.

use anyhow::{Context as _, Result};
use serde_json::Value;
use tracing::debug;

use crate::config::ScannerConfig;

#[derive(Clone)]
pub struct ScannerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    tags: Vec<String>,
}

impl ScannerClient {
    pub fn new(cfg: &ScannerConfig) -> Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| region_base_url(&cfg.region));
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key: cfg.api_key.clone(),
            tags: cfg.tags.clone(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Upload `bytes` for scanning and return the raw JSON verdict.
    pub async fn scan(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value> {
        let key = self
            .api_key
            .as_ref()
            .context("no scan API key configured")?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("tags", self.tags.join(","));

        let url = format!("{}/api/scan", self.base_url);
        debug!(file = file_name, url = %url, "submitting file for scanning");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .context("scan request failed")?
            .error_for_status()
            .context("scan API returned an error status")?;

        resp.json::<Value>()
            .await
            .context("failed to decode scan verdict")
    }
}

/// A verdict is malicious when `scanResult == 1` or `foundMalwares` is a
/// non-empty array. Some API revisions report one but not the other.
pub fn verdict_is_malicious(verdict: &Value) -> bool {
    if verdict.get("scanResult").and_then(Value::as_i64) == Some(1) {
        return true;
    }
    verdict
        .get("foundMalwares")
        .and_then(Value::as_array)
        .is_some_and(|m| !m.is_empty())
}

fn region_base_url(region: &str) -> String {
    format!("https://antimalware.{region}.cloudone.trendmicro.com")
}
