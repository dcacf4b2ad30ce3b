// SPDX-License-Identifier: MIT
//! Content-safety guard client.
//!
//! The chat service calls the guard twice per request: once on the prompt,
//! once on the assembled response. A `Block` action on either side stops the
//! request. Without an API key every check is skipped — the demo runs fine
//! unguarded.

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::GuardConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Allow,
    Block { reason: Option<String> },
    /// No API key configured — check not performed.
    Skipped,
}

#[derive(Deserialize)]
struct GuardResponse {
    action: Option<String>,
    reason: Option<String>,
}

#[derive(Clone)]
pub struct GuardClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GuardClient {
    pub fn new(cfg: &GuardConfig) -> Result<Self> {
        if cfg.api_key.is_none() {
            info!("no guard API key configured — content-safety checks will be skipped");
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    /// Check `content` against the guard API. `label` is only used for
    /// logging ("prompt" or "response").
    pub async fn check(&self, label: &str, content: &str) -> Result<GuardDecision> {
        let Some(key) = &self.api_key else {
            debug!(label, "no guard API key — skipping check");
            return Ok(GuardDecision::Skipped);
        };

        let url = format!("{}/guard?detailedResponse=false", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&serde_json::json!({ "guard": content }))
            .send()
            .await?
            .error_for_status()?;

        let body: GuardResponse = resp.json().await?;
        debug!(
            label,
            action = body.action.as_deref().unwrap_or(""),
            reason = body.reason.as_deref().unwrap_or(""),
            "guard verdict"
        );

        if is_block(body.action.as_deref()) {
            Ok(GuardDecision::Block {
                reason: body.reason,
            })
        } else {
            Ok(GuardDecision::Allow)
        }
    }
}

/// The guard gates on `action == "Block"`, case-insensitively. Any other
/// action (or a missing field) allows the content through.
fn is_block(action: Option<&str>) -> bool {
    action.is_some_and(|a| a.eq_ignore_ascii_case("block"))
}
