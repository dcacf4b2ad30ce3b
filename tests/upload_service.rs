//! Upload service tests: multipart posts against a served router, wiremock
//! standing in for the malware-scan API.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bpc_services::{config::ServicesConfig, upload, AppContext};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_config(upload_dir: &Path) -> ServicesConfig {
    let mut cfg = ServicesConfig::default();
    cfg.scanner.api_key = None;
    cfg.upload.dir = Some(upload_dir.to_path_buf());
    cfg
}

async fn serve_upload(cfg: ServicesConfig) -> SocketAddr {
    let ctx = Arc::new(AppContext::new(Arc::new(cfg)).unwrap());
    let router = upload::build_router(ctx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn file_form(name: &str, contents: &[u8]) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(contents.to_vec()).file_name(name.to_string()),
    )
}

async fn post_upload(addr: SocketAddr, route: &str, form: reqwest::multipart::Form) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}{route}"))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn upload_without_api_key_skips_scan_and_removes_file() {
    let dir = TempDir::new().unwrap();
    let addr = serve_upload(base_config(dir.path())).await;

    let resp = post_upload(addr, "/upload", file_form("hello.txt", b"hi there")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scan_result_code"], -1);
    assert_eq!(body["scan_results"]["status"], "skipped");

    // Protected uploads never persist.
    assert!(!dir.path().join("hello.txt").exists());
}

#[tokio::test]
async fn vulnerable_upload_persists_file() {
    let dir = TempDir::new().unwrap();
    let addr = serve_upload(base_config(dir.path())).await;

    let resp = post_upload(addr, "/upload-vulnerable", file_form("keep.bin", b"payload")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scan_result_code"], -4);
    assert_eq!(body["scan_results"]["status"], "vulnerable");

    let kept = dir.path().join("keep.bin");
    assert!(kept.exists());
    assert_eq!(std::fs::read(kept).unwrap(), b"payload");
}

#[tokio::test]
async fn protected_upload_sanitizes_traversal_names() {
    let dir = TempDir::new().unwrap();
    let addr = serve_upload(base_config(dir.path())).await;

    let resp = post_upload(addr, "/upload", file_form("../../escape.txt", b"x")).await;
    assert_eq!(resp.status(), 200);

    // Nothing escaped the upload directory, and the sanitized file was removed.
    assert!(!dir.path().join("escape.txt").exists());
    let parent = dir.path().parent().unwrap();
    assert!(!parent.join("escape.txt").exists());
}

#[tokio::test]
async fn malicious_verdict_maps_to_one() {
    let scan_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(url_path("/api/scan"))
        .and(header("authorization", "Bearer scan-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scanResult": 1,
            "foundMalwares": [{ "fileName": "eicar", "malwareName": "Eicar_test_file" }]
        })))
        .expect(1)
        .mount(&scan_api)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cfg = base_config(dir.path());
    cfg.scanner.api_key = Some("scan-key".to_string());
    cfg.scanner.base_url = Some(scan_api.uri());
    let addr = serve_upload(cfg).await;

    let resp = post_upload(addr, "/upload", file_form("eicar.com", b"X5O!...")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scan_result_code"], 1);
    assert_eq!(body["scan_results"]["scanResult"], 1);
}

#[tokio::test]
async fn clean_verdict_maps_to_zero() {
    let scan_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(url_path("/api/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scanResult": 0,
            "foundMalwares": []
        })))
        .mount(&scan_api)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cfg = base_config(dir.path());
    cfg.scanner.api_key = Some("scan-key".to_string());
    cfg.scanner.base_url = Some(scan_api.uri());
    let addr = serve_upload(cfg).await;

    let resp = post_upload(addr, "/upload", file_form("report.pdf", b"clean bytes")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scan_result_code"], 0);
}

#[tokio::test]
async fn scan_api_failure_is_reported_not_fatal() {
    let scan_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(url_path("/api/scan"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&scan_api)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cfg = base_config(dir.path());
    cfg.scanner.api_key = Some("scan-key".to_string());
    cfg.scanner.base_url = Some(scan_api.uri());
    let addr = serve_upload(cfg).await;

    let resp = post_upload(addr, "/upload", file_form("a.txt", b"data")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scan_result_code"], -2);
    assert_eq!(body["scan_results"]["status"], "error");
}

#[tokio::test]
async fn empty_file_skips_scan() {
    let dir = TempDir::new().unwrap();
    let mut cfg = base_config(dir.path());
    cfg.scanner.api_key = Some("scan-key".to_string());
    let addr = serve_upload(cfg).await;

    let resp = post_upload(addr, "/upload", file_form("empty.txt", b"")).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scan_result_code"], -3);
    assert_eq!(body["scan_results"]["reason"], "Empty file");
}

#[tokio::test]
async fn oversized_file_skips_scan() {
    let dir = TempDir::new().unwrap();
    let mut cfg = base_config(dir.path());
    cfg.scanner.api_key = Some("scan-key".to_string());
    cfg.scanner.max_scan_bytes = 4;
    let addr = serve_upload(cfg).await;

    let resp = post_upload(addr, "/upload", file_form("big.bin", b"more than four bytes")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scan_result_code"], -3);
    assert_eq!(body["scan_results"]["reason"], "File too large");
}

#[tokio::test]
async fn missing_file_field_is_400() {
    let dir = TempDir::new().unwrap();
    let addr = serve_upload(base_config(dir.path())).await;

    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let resp = post_upload(addr, "/upload", form).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn root_redirects_to_upload() {
    let dir = TempDir::new().unwrap();
    let addr = serve_upload(base_config(dir.path())).await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let resp = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(resp.headers()["location"], "/upload");
}

#[tokio::test]
async fn health_reports_upload_service() {
    let dir = TempDir::new().unwrap();
    let addr = serve_upload(base_config(dir.path())).await;
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "upload");
}
