// SPDX-License-Identifier: MIT
//! Scan orchestration and the numeric result-code convention.
//!
//! Codes: 0 clean, 1 malicious, negative = skipped/error. A failed or
//! skipped scan never fails the upload request — the response carries the
//! code and a `scan_results` object explaining it.

use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::scanner;
use crate::AppContext;

pub const CODE_CLEAN: i32 = 0;
pub const CODE_MALICIOUS: i32 = 1;
/// Scan skipped: no API key configured.
pub const CODE_SKIPPED_NO_KEY: i32 = -1;
/// Scan attempted but failed (request or verdict decode).
pub const CODE_SCAN_FAILED: i32 = -2;
/// Scan skipped: empty file or over the size cap.
pub const CODE_SKIPPED_FILE: i32 = -3;
/// Vulnerable endpoint: scanning deliberately not performed.
pub const CODE_VULNERABLE: i32 = -4;

/// Run the scan decision ladder for a saved upload and build the response
/// body: `{"scan_result_code": <code>, "scan_results": {...}}`.
pub async fn scan_uploaded(ctx: &AppContext, path: &Path, file_name: &str, size: u64) -> Value {
    if !ctx.scanner.has_api_key() {
        warn!("no scan API key configured — upload not scanned");
        return report(
            CODE_SKIPPED_NO_KEY,
            json!({
                "status": "skipped",
                "reason": "No API key configured",
                "message": "File uploaded successfully but not scanned due to missing API key",
            }),
        );
    }

    if size == 0 {
        info!(file = file_name, "empty file — skipping scan");
        return report(
            CODE_SKIPPED_FILE,
            json!({
                "status": "skipped",
                "reason": "Empty file",
                "message": "File is empty, no scan needed",
                "file_name": file_name,
                "file_size": size,
            }),
        );
    }

    if size > ctx.config.scanner.max_scan_bytes {
        warn!(file = file_name, size, "file too large for scanning — skipping");
        return report(
            CODE_SKIPPED_FILE,
            json!({
                "status": "skipped",
                "reason": "File too large",
                "message": "File exceeds maximum size for scanning",
                "file_name": file_name,
                "file_size": size,
            }),
        );
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), err = %e, "failed to read saved upload");
            return report(
                CODE_SCAN_FAILED,
                json!({
                    "status": "error",
                    "reason": "File scan failed",
                    "error": e.to_string(),
                    "file_name": file_name,
                    "file_size": size,
                }),
            );
        }
    };

    let start = Instant::now();
    let verdict = match ctx.scanner.scan(file_name, bytes).await {
        Ok(v) => v,
        Err(e) => {
            warn!(file = file_name, err = %format!("{e:#}"), "scan failed");
            return report(
                CODE_SCAN_FAILED,
                json!({
                    "status": "error",
                    "reason": "File scan failed",
                    "error": format!("{e:#}"),
                    "file_name": file_name,
                    "file_size": size,
                }),
            );
        }
    };
    info!(
        file = file_name,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "scan complete"
    );

    let code = if scanner::verdict_is_malicious(&verdict) {
        warn!(file = file_name, "file is malicious");
        CODE_MALICIOUS
    } else {
        info!(file = file_name, "file is clean");
        CODE_CLEAN
    };
    report(code, verdict)
}

fn report(code: i32, results: Value) -> Value {
    json!({
        "scan_result_code": code,
        "scan_results": results,
    })
}
