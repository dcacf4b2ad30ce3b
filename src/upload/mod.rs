// SPDX-License-Identifier: MIT
// upload/mod.rs — File-upload malware-scanning service.
//
// Endpoints:
//   GET  /                   → redirect to /upload
//   GET  /health
//   GET  /upload             → short description
//   POST /upload             → protected: size cap, sanitized filename, scanned, file removed
//   GET  /upload-vulnerable  → short description
//   POST /upload-vulnerable  → intentionally insecure demo counterpart:
//                              raised cap, raw filename, no scan, file persists

pub mod scan;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Redirect,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppContext;

pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let upload_dir = ctx.config.upload_dir();
    tokio::fs::create_dir_all(&upload_dir).await?;

    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.upload_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, dir = %upload_dir.display(), "upload service listening");
    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(crate::shutdown_signal())
        .await?;
    info!("upload service stopped");
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let cors = ctx.origin_policy.cors_layer();
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/upload",
            get(upload_page)
                .post(upload)
                .layer(DefaultBodyLimit::max(ctx.config.upload.max_upload_bytes)),
        )
        .route(
            "/upload-vulnerable",
            get(vulnerable_page)
                .post(upload_vulnerable)
                .layer(DefaultBodyLimit::max(ctx.config.upload.vulnerable_max_bytes)),
        )
        .layer(cors)
        .with_state(ctx)
}

async fn root() -> Redirect {
    Redirect::to("/upload")
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "upload",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.uptime_secs(),
    }))
}

async fn upload_page() -> &'static str {
    "Protected upload endpoint - files are scanned\n"
}

async fn vulnerable_page() -> &'static str {
    "VULNERABLE upload endpoint - files are NOT scanned\n"
}

/// Protected upload: sanitize the filename, cap the size (body limit),
/// scan, and remove the file once the verdict is in.
async fn upload(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, String)> {
    let (raw_name, data) = read_file_field(&mut multipart)
        .await
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    let Some(file_name) = sanitize_filename(&raw_name) else {
        return Err((StatusCode::BAD_REQUEST, "No selected file".to_string()));
    };

    let dir = ctx.config.upload_dir();
    let path = dir.join(&file_name);
    tokio::fs::write(&path, &data).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Cannot create file: {e}"),
        )
    })?;
    info!(file = %file_name, size = data.len(), "file saved for scanning");

    let report = scan::scan_uploaded(&ctx, &path, &file_name, data.len() as u64).await;

    // Protected uploads never persist.
    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), err = %e, "failed to remove scanned file");
    }

    Ok(Json(report))
}

/// Deliberately insecure counterpart: the raised body limit is the only
/// restriction. The raw filename is used as-is (path traversal included),
/// nothing is scanned, and the file stays on disk.
async fn upload_vulnerable(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, String)> {
    let (raw_name, data) = read_file_field(&mut multipart)
        .await
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    if raw_name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No selected file".to_string()));
    }

    let path = ctx.config.upload_dir().join(&raw_name);
    warn!(file = %raw_name, size = data.len(), "VULNERABLE upload — no sanitization, no scan");
    tokio::fs::write(&path, &data).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Cannot create file: {e}"),
        )
    })?;

    Ok(Json(json!({
        "scan_result_code": scan::CODE_VULNERABLE,
        "scan_results": {
            "status": "vulnerable",
            "reason": "Vulnerable endpoint - no scanning performed",
            "message": "File uploaded successfully but NO security scanning was performed",
            "file_path": path.display().to_string(),
            "file_size": data.len(),
        },
    })))
}

/// Pull the `file` field out of the multipart form.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Bytes), String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Cannot parse form: {e}"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| format!("Error retrieving file: {e}"))?;
        return Ok((file_name, data));
    }
    Err("Error retrieving file: missing 'file' field".to_string())
}

/// Reduce a client-supplied filename to its basename. Returns None when
/// nothing usable remains (empty name, bare separators).
pub fn sanitize_filename(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Path::new(trimmed)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}
