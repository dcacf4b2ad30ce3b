// SPDX-License-Identifier: MIT
//! Local LLM runtime client (Ollama-style HTTP API).
//!
//! `/api/generate` is always called with `stream: true`; the response is a
//! sequence of JSON lines `{"response": "...", "done": false}` terminated by
//! a line with `done: true`. Lines can be split across network frames, so
//! assembly buffers partial lines between chunks.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ChatConfig;

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("generate request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("error reading generate stream: {0}")]
    Stream(#[source] reqwest::Error),
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize, Default)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(cfg: &ChatConfig) -> anyhow::Result<Self> {
        // Connect timeout only — generation streams for as long as it takes.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(cfg.connect_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.ollama_url.clone(),
            model: cfg.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run a streamed generation and return the assembled reply.
    pub async fn generate(&self, prompt: &str) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: true,
            })
            .send()
            .await
            .map_err(OllamaError::Request)?;

        let mut stream = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut reply = String::new();
        let mut done = false;

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(OllamaError::Stream)?;
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if append_chunk(&mut reply, &line) {
                    done = true;
                    break 'read;
                }
            }
        }
        // A final chunk without a trailing newline still counts, but anything
        // left in the buffer after the done line is discarded.
        if !done && !pending.is_empty() {
            append_chunk(&mut reply, &pending);
        }

        debug!(model = %self.model, reply_len = reply.len(), "generation complete");
        Ok(reply)
    }

    /// Ask the runtime to pull the configured model, streaming progress lines
    /// into the log. Failure is the caller's problem (startup treats it as
    /// non-fatal — the runtime may already have the model).
    pub async fn pull(&self) -> anyhow::Result<()> {
        info!(model = %self.model, "pulling model");
        let url = format!("{}/api/pull", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "name": self.model }))
            .send()
            .await?
            .error_for_status()?;

        let mut stream = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if let Ok(v) = serde_json::from_slice::<serde_json::Value>(&line) {
                    if let Some(status) = v.get("status").and_then(serde_json::Value::as_str) {
                        debug!(model = %self.model, status, "pull progress");
                    }
                }
            }
        }
        info!(model = %self.model, "model pull complete");
        Ok(())
    }
}

/// Parse one JSON line and append its `response` text to `reply`.
/// Returns true when the line carries `done: true`. Unparseable lines are
/// skipped, matching the tolerant behavior clients expect from the runtime.
fn append_chunk(reply: &mut String, line: &[u8]) -> bool {
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return false;
    }
    match serde_json::from_slice::<GenerateChunk>(line) {
        Ok(chunk) => {
            reply.push_str(&chunk.response);
            chunk.done
        }
        Err(_) => false,
    }
}
