// SPDX-License-Identifier: MIT
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_CHAT_PORT: u16 = 5001;
const DEFAULT_TERMINAL_PORT: u16 = 8081;
const DEFAULT_UPLOAD_PORT: u16 = 5000;
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
// Small, efficient default — larger models can be selected with OLLAMA_MODEL.
const DEFAULT_MODEL: &str = "tinyllama:1.1b-chat";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for the Boring Paper Company.";
const DEFAULT_GUARD_BASE_URL: &str = "https://api.xdr.trendmicro.com/beta/aiSecurity";
const DEFAULT_SCAN_REGION: &str = "us-east-1";
const MAX_UPLOAD_BYTES: usize = 10 << 20;
const VULNERABLE_MAX_BYTES: usize = 100 << 20;
const MAX_SCAN_BYTES: u64 = 100 << 20;

fn default_bind_address() -> String {
    // Demo services sit behind the ui-service container; bind all interfaces.
    "0.0.0.0".to_string()
}

// ─── ChatConfig ───────────────────────────────────────────────────────────────

/// Chat proxy configuration (`[chat]` in config.toml).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the local LLM runtime (OLLAMA_URL env var).
    pub ollama_url: String,
    /// Model name to pull and generate with (OLLAMA_MODEL env var).
    pub model: String,
    /// Prefix prepended to every user prompt.
    pub system_prompt: String,
    /// Connect timeout for LLM runtime requests, in seconds. The overall
    /// request has no deadline — generation streams for as long as it takes.
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

// ─── GuardConfig ──────────────────────────────────────────────────────────────

/// Content-safety guard configuration (`[guard]` in config.toml).
///
/// With no API key the guard is skipped entirely — requests flow unchecked.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Bearer token for the guard API (GUARD_API_KEY env var, API_KEY fallback).
    pub api_key: Option<String>,
    /// Base URL of the guard API.
    pub base_url: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GUARD_BASE_URL.to_string(),
        }
    }
}

// ─── ScannerConfig ────────────────────────────────────────────────────────────

/// Malware-scan configuration (`[scanner]` in config.toml).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Bearer token for the scan API (SCAN_API_KEY env var, API_KEY fallback).
    pub api_key: Option<String>,
    /// Scan API region (REGION env var). Used to derive the endpoint when
    /// `base_url` is not set explicitly.
    pub region: String,
    /// Explicit scan API base URL. Overrides the region-derived endpoint.
    pub base_url: Option<String>,
    /// Files larger than this are not scanned (the scan API has its own cap).
    pub max_scan_bytes: u64,
    /// Tags attached to every scan request.
    pub tags: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            region: DEFAULT_SCAN_REGION.to_string(),
            base_url: None,
            max_scan_bytes: MAX_SCAN_BYTES,
            tags: vec!["bpc-uploads".to_string()],
        }
    }
}

// ─── TerminalConfig ───────────────────────────────────────────────────────────

/// Web terminal configuration (`[terminal]` in config.toml).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell spawned under the PTY (SHELL env var, default /bin/bash).
    pub shell: String,
    /// Delay between websocket disconnect and killing the shell, in ms.
    pub grace_ms: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string()),
            grace_ms: 200,
        }
    }
}

// ─── UploadConfig ─────────────────────────────────────────────────────────────

/// Upload service configuration (`[upload]` in config.toml).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory uploaded files are written to. Default: `{data_dir}/uploads`.
    pub dir: Option<PathBuf>,
    /// Request body cap for the protected endpoint.
    pub max_upload_bytes: usize,
    /// Request body cap for the deliberately insecure endpoint.
    pub vulnerable_max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            vulnerable_max_bytes: VULNERABLE_MAX_BYTES,
        }
    }
}

// ─── CorsConfig ───────────────────────────────────────────────────────────────

/// Origin allowlist (`[cors]` in config.toml).
///
/// `ALLOWED_ORIGINS` (comma-separated) and `LOAD_BALANCER_IP` env vars append
/// to `allowed_origins` at load time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins matched exactly.
    pub allowed_origins: Vec<String>,
    /// Host suffixes matched against http(s) origins (cloud load balancers).
    pub allowed_suffixes: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: [
                "http://ui-service",
                "https://ui-service",
                "http://localhost",
                "https://localhost",
                "http://boringpapercompany.com",
                "https://boringpapercompany.com",
                "http://gcp.boringpapercompany.com",
                "https://gcp.boringpapercompany.com",
                "http://azure.boringpapercompany.com",
                "https://azure.boringpapercompany.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            allowed_suffixes: [".elb.amazonaws.com", ".cloudapp.azure.com", ".run.app"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Chat service port (default: 5001).
    chat_port: Option<u16>,
    /// Terminal service port (default: 8081).
    terminal_port: Option<u16>,
    /// Upload service port (default: 5000).
    upload_port: Option<u16>,
    /// Bind address for all three services (default: "0.0.0.0").
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,bpc_services=trace".
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Chat proxy configuration (`[chat]`).
    chat: Option<ChatConfig>,
    /// Content-safety guard configuration (`[guard]`).
    guard: Option<GuardConfig>,
    /// Malware-scan configuration (`[scanner]`).
    scanner: Option<ScannerConfig>,
    /// Web terminal configuration (`[terminal]`).
    terminal: Option<TerminalConfig>,
    /// Upload service configuration (`[upload]`).
    upload: Option<UploadConfig>,
    /// Origin allowlist (`[cors]`).
    cors: Option<CorsConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

// ─── ServicesConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub chat_port: u16,
    pub terminal_port: u16,
    pub upload_port: u16,
    /// Bind address shared by all three services (BPC_BIND env var).
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json" (BPC_LOG_FORMAT env var).
    pub log_format: String,
    pub chat: ChatConfig,
    pub guard: GuardConfig,
    pub scanner: ScannerConfig,
    pub terminal: TerminalConfig,
    pub upload: UploadConfig,
    pub cors: CorsConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            chat_port: DEFAULT_CHAT_PORT,
            terminal_port: DEFAULT_TERMINAL_PORT,
            upload_port: DEFAULT_UPLOAD_PORT,
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            log: "info".to_string(),
            log_format: "pretty".to_string(),
            chat: ChatConfig::default(),
            guard: GuardConfig::default(),
            scanner: ScannerConfig::default(),
            terminal: TerminalConfig::default(),
            upload: UploadConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl ServicesConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap, or read here for
    ///      the env vars the original deployment manifests set (OLLAMA_URL,
    ///      API_KEY, REGION, ALLOWED_ORIGINS, ...)
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        chat_port: Option<u16>,
        terminal_port: Option<u16>,
        upload_port: Option<u16>,
        bind_address: Option<String>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let mut cfg = Self {
            chat_port: chat_port.or(toml.chat_port).unwrap_or(DEFAULT_CHAT_PORT),
            terminal_port: terminal_port
                .or(toml.terminal_port)
                .unwrap_or(DEFAULT_TERMINAL_PORT),
            upload_port: upload_port
                .or(toml.upload_port)
                .unwrap_or(DEFAULT_UPLOAD_PORT),
            bind_address: bind_address
                .or(toml.bind_address)
                .unwrap_or_else(default_bind_address),
            data_dir,
            log: log.or(toml.log).unwrap_or_else(|| "info".to_string()),
            log_format: env_var("BPC_LOG_FORMAT")
                .or(toml.log_format)
                .unwrap_or_else(|| "pretty".to_string()),
            chat: toml.chat.unwrap_or_default(),
            guard: toml.guard.unwrap_or_default(),
            scanner: toml.scanner.unwrap_or_default(),
            terminal: toml.terminal.unwrap_or_default(),
            upload: toml.upload.unwrap_or_default(),
            cors: toml.cors.unwrap_or_default(),
        };

        if let Some(url) = env_var("OLLAMA_URL") {
            cfg.chat.ollama_url = url;
        }
        if let Some(model) = env_var("OLLAMA_MODEL") {
            cfg.chat.model = model;
        }

        // The original services each read API_KEY in their own process;
        // single-process here, so service-specific vars take precedence
        // and API_KEY remains the shared fallback.
        if let Some(key) = env_var("GUARD_API_KEY").or_else(|| env_var("API_KEY")) {
            cfg.guard.api_key = Some(key);
        }
        if let Some(key) = env_var("SCAN_API_KEY").or_else(|| env_var("API_KEY")) {
            cfg.scanner.api_key = Some(key);
        }
        if let Some(region) = env_var("REGION") {
            cfg.scanner.region = region;
        }

        if let Some(extra) = env_var("ALLOWED_ORIGINS") {
            cfg.cors.allowed_origins.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(ip) = env_var("LOAD_BALANCER_IP") {
            cfg.cors.allowed_origins.push(format!("http://{ip}"));
            cfg.cors.allowed_origins.push(format!("https://{ip}"));
        }

        cfg
    }

    /// Directory uploaded files are written to.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/bpc-services
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("bpc-services");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/bpc-services or ~/.local/share/bpc-services
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("bpc-services");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("bpc-services");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\bpc-services
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("bpc-services");
        }
    }
    // Fallback
    PathBuf::from(".bpc-services")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_toml() {
        let dir = TempDir::new().unwrap();
        let cfg = ServicesConfig::new(None, None, None, None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.chat_port, 5001);
        assert_eq!(cfg.terminal_port, 8081);
        assert_eq!(cfg.upload_port, 5000);
        assert_eq!(cfg.upload.max_upload_bytes, 10 << 20);
        assert_eq!(cfg.terminal.grace_ms, 200);
        assert_eq!(cfg.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(cfg.scanner.tags, vec!["bpc-uploads".to_string()]);
        assert_eq!(cfg.upload_dir(), dir.path().join("uploads"));
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
chat_port = 6001

[terminal]
grace_ms = 500

[upload]
max_upload_bytes = 1024

[chat]
system_prompt = "Answer tersely."
connect_timeout_secs = 5
"#,
        )
        .unwrap();
        let cfg = ServicesConfig::new(None, None, None, None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.chat_port, 6001);
        assert_eq!(cfg.terminal_port, 8081);
        assert_eq!(cfg.terminal.grace_ms, 500);
        assert_eq!(cfg.upload.max_upload_bytes, 1024);
        assert_eq!(cfg.chat.system_prompt, "Answer tersely.");
        assert_eq!(cfg.chat.connect_timeout_secs, 5);
    }

    #[test]
    fn cli_beats_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "chat_port = 6001\n").unwrap();
        let cfg = ServicesConfig::new(
            Some(7001),
            None,
            None,
            None,
            Some(dir.path().to_path_buf()),
            None,
        );
        assert_eq!(cfg.chat_port, 7001);
    }

    #[test]
    fn bad_toml_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "chat_port = \"not a port").unwrap();
        let cfg = ServicesConfig::new(None, None, None, None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.chat_port, 5001);
    }

    #[test]
    fn explicit_upload_dir_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[upload]\ndir = \"/tmp/bpc-up\"\n",
        )
        .unwrap();
        let cfg = ServicesConfig::new(None, None, None, None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.upload_dir(), PathBuf::from("/tmp/bpc-up"));
    }
}
