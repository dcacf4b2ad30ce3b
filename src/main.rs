// SPDX-License-Identifier: MIT
use anyhow::{Context as _, Result};
use bpc_services::{chat, config::ServicesConfig, terminal, upload, AppContext};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "bpcd",
    about = "Boring Paper Company — demo backend services",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Chat service port
    #[arg(long, env = "BPC_CHAT_PORT")]
    chat_port: Option<u16>,

    /// Terminal service port
    #[arg(long, env = "BPC_TERMINAL_PORT")]
    terminal_port: Option<u16>,

    /// Upload service port
    #[arg(long, env = "BPC_UPLOAD_PORT")]
    upload_port: Option<u16>,

    /// Bind address for all three services (default: 0.0.0.0)
    #[arg(long, env = "BPC_BIND")]
    bind_address: Option<String>,

    /// Data directory for config.toml and uploads
    #[arg(long, env = "BPC_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BPC_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "BPC_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,

    /// Suppress informational console output.
    ///
    /// Errors are still printed to stderr, and file logging (--log-file) is
    /// unaffected.
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run all three services (default when no subcommand given).
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(ServicesConfig::new(
        args.chat_port,
        args.terminal_port,
        args.upload_port,
        args.bind_address,
        args.data_dir,
        args.log,
    ));

    let _log_guard = init_tracing(
        console_filter(args.quiet, &config.log),
        &config.log,
        &config.log_format,
        args.log_file.as_deref(),
    );

    match args.command {
        None | Some(Command::Serve) => run_services(config).await,
    }
}

async fn run_services(config: Arc<ServicesConfig>) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        chat_port = config.chat_port,
        terminal_port = config.terminal_port,
        upload_port = config.upload_port,
        "starting bpcd"
    );

    let ctx = Arc::new(AppContext::new(config).context("failed to build app context")?);

    // Bootstrap the model in the background; the runtime may already have it,
    // and the chat service is usable as soon as the pull completes.
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = ctx.ollama.pull().await {
                warn!(model = ctx.ollama.model(), err = %format!("{e:#}"), "model pull failed");
            }
        });
    }

    let chat_task = tokio::spawn(chat::serve(ctx.clone()));
    let terminal_task = tokio::spawn(terminal::serve(ctx.clone()));
    let upload_task = tokio::spawn(upload::serve(ctx));

    let (chat_res, terminal_res, upload_res) =
        tokio::try_join!(chat_task, terminal_task, upload_task).context("service task panicked")?;
    chat_res?;
    terminal_res?;
    upload_res?;

    info!("all services stopped");
    Ok(())
}

/// Console filter string: --quiet drops the console to errors only.
fn console_filter(quiet: bool, log_level: &str) -> &str {
    if quiet {
        "error"
    } else {
        log_level
    }
}

/// Initialise tracing. Returns a guard that must be held for the lifetime of
/// the program when file logging is enabled. The console and the log file
/// get separate filters so --quiet never mutes the file.
fn init_tracing(
    console_level: &str,
    file_level: &str,
    log_format: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer as _,
    };

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("bpcd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(console_level)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(console_level)
                    .compact()
                    .init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_filter(EnvFilter::new(console_level)))
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_filter(EnvFilter::new(file_level)),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().compact().with_filter(EnvFilter::new(console_level)))
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_filter(EnvFilter::new(file_level)),
                )
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(console_level)
            .init();
        None
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(console_level)
            .compact()
            .init();
        None
    }
}
