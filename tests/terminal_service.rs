//! Terminal service tests: real websocket client against the accept loop,
//! driving an actual shell under a PTY.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bpc_services::{config::ServicesConfig, terminal, AppContext};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};

fn base_config() -> ServicesConfig {
    let mut cfg = ServicesConfig::default();
    cfg.terminal.shell = "/bin/sh".to_string();
    cfg.terminal.grace_ms = 10;
    cfg
}

async fn start_terminal(cfg: ServicesConfig) -> SocketAddr {
    let ctx = Arc::new(AppContext::new(Arc::new(cfg)).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(terminal::run(listener, ctx));
    addr
}

#[tokio::test]
async fn relays_shell_output_over_websocket() {
    let addr = start_terminal(base_config()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/terminal"))
        .await
        .expect("websocket handshake");

    ws.send(Message::Text("printf ws-relay-ok\n".to_string()))
        .await
        .unwrap();

    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("no shell output before timeout");
        match msg {
            Some(Ok(Message::Binary(bytes))) => collected.extend_from_slice(&bytes),
            Some(Ok(Message::Text(text))) => collected.extend_from_slice(text.as_bytes()),
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("websocket error: {e}"),
            None => break,
        }
        if String::from_utf8_lossy(&collected).contains("ws-relay-ok") {
            break;
        }
    }
    assert!(String::from_utf8_lossy(&collected).contains("ws-relay-ok"));

    let _ = ws.send(Message::Close(None)).await;
}

#[tokio::test]
async fn closes_when_shell_exits() {
    let addr = start_terminal(base_config()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/terminal"))
        .await
        .expect("websocket handshake");

    ws.send(Message::Text("exit\n".to_string())).await.unwrap();

    // Drain until the server closes the socket.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("socket did not close after shell exit");
        match msg {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
        }
    }
}

#[tokio::test]
async fn allows_localhost_origin_on_any_port() {
    let addr = start_terminal(base_config()).await;
    let mut req = format!("ws://{addr}/terminal")
        .into_client_request()
        .unwrap();
    req.headers_mut()
        .insert("Origin", "http://localhost:3000".parse().unwrap());
    let (mut ws, _) = connect_async(req).await.expect("localhost origin rejected");
    let _ = ws.send(Message::Close(None)).await;
}

#[tokio::test]
async fn rejects_unknown_origin() {
    let addr = start_terminal(base_config()).await;
    let mut req = format!("ws://{addr}/terminal")
        .into_client_request()
        .unwrap();
    req.headers_mut()
        .insert("Origin", "https://evil.example.com".parse().unwrap());
    assert!(connect_async(req).await.is_err());
}

#[tokio::test]
async fn rejects_unknown_path() {
    let addr = start_terminal(base_config()).await;
    assert!(connect_async(format!("ws://{addr}/shell")).await.is_err());
}
