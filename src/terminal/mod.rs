// SPDX-License-Identifier: MIT
// terminal/mod.rs — Browser-terminal-over-websocket bridge.
//
// WebSocket endpoint /terminal on its own port. Each connection gets an
// interactive shell under a PTY; bytes are relayed in both directions until
// either side closes, then the shell is killed after a short grace delay.

pub mod pty;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        Message,
    },
};
use tracing::{debug, error, info, warn};

use crate::AppContext;
use pty::PtyEvent;

pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.terminal_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "terminal service listening (WebSocket /terminal)");
    run(listener, ctx).await
}

/// Accept loop over an already-bound listener. Split out so tests can bind
/// an ephemeral port themselves.
pub async fn run(listener: TcpListener, ctx: Arc<AppContext>) -> Result<()> {
    let shutdown = crate::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping terminal service");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new terminal connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "terminal connection error");
                    }
                });
            }
        }
    }

    info!("terminal service stopped");
    Ok(())
}

fn reject(status: StatusCode, body: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(body.to_string()));
    *resp.status_mut() = status;
    resp
}

async fn handle_connection(stream: TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    let policy = ctx.origin_policy.clone();
    let ws = accept_hdr_async(stream, move |req: &Request, resp: Response| {
        if req.uri().path() != "/terminal" {
            return Err(reject(StatusCode::NOT_FOUND, "not found"));
        }
        let origin = req
            .headers()
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !policy.allows_terminal(origin) {
            return Err(reject(StatusCode::FORBIDDEN, "origin not allowed"));
        }
        Ok(resp)
    })
    .await?;

    let (mut sink, mut stream) = ws.split();
    let mut shell = pty::spawn_shell(&ctx.config.terminal.shell)?;

    loop {
        tokio::select! {
            // Shell output → websocket
            event = shell.output.recv() => {
                match event {
                    Some(PtyEvent::Output(bytes)) => {
                        if let Err(e) = sink.send(Message::Binary(bytes)).await {
                            warn!(err = %e, "websocket send error");
                            break;
                        }
                    }
                    Some(PtyEvent::Exit(code)) => {
                        debug!(?code, "shell exited — closing websocket");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(PtyEvent::Error(e)) => {
                        warn!(err = %e, "PTY error — closing websocket");
                        break;
                    }
                    None => break,
                }
            }
            // Websocket input → shell
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let _ = shell.input.send(data);
                    }
                    Some(Ok(Message::Text(text))) => {
                        let _ = shell.input.send(text.into_bytes());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Give the shell a moment to flush, then clean up.
    tokio::time::sleep(std::time::Duration::from_millis(ctx.config.terminal.grace_ms)).await;
    shell.kill();
    Ok(())
}
