// SPDX-License-Identifier: MIT
pub mod chat;
pub mod config;
pub mod cors;
pub mod guard;
pub mod scanner;
pub mod terminal;
pub mod upload;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use config::ServicesConfig;
use cors::OriginPolicy;
use guard::GuardClient;
use scanner::ScannerClient;

/// Shared application state passed to every request handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServicesConfig>,
    /// Origin allowlist shared by the CORS layers and the terminal handshake.
    pub origin_policy: OriginPolicy,
    /// Content-safety guard client (chat service).
    pub guard: GuardClient,
    /// Local LLM runtime client (chat service).
    pub ollama: chat::ollama::OllamaClient,
    /// Cloud malware-scan client (upload service).
    pub scanner: ScannerClient,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(config: Arc<ServicesConfig>) -> Result<Self> {
        let origin_policy = OriginPolicy::from_config(&config.cors);
        let guard = GuardClient::new(&config.guard)?;
        let ollama = chat::ollama::OllamaClient::new(&config.chat)?;
        let scanner = ScannerClient::new(&config.scanner)?;
        Ok(Self {
            config,
            origin_policy,
            guard,
            ollama,
            scanner,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
