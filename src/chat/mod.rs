// SPDX-License-Identifier: MIT
// chat/mod.rs — Chat proxy service.
//
// Thin front end over the local LLM runtime with an optional content-safety
// gate on both the prompt and the assembled response.
//
// Endpoints:
//   POST /chat     {message, securityEnabled?} → {response}
//   GET  /health

pub mod ollama;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::guard::GuardDecision;
use crate::AppContext;
use ollama::OllamaError;

pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.chat_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "chat service listening");
    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(crate::shutdown_signal())
        .await?;
    info!("chat service stopped");
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let cors = ctx.origin_policy.cors_layer();
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(cors)
        .with_state(ctx)
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "chat",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.uptime_secs(),
    }))
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    /// Defaults to true when omitted — the UI toggle sends false explicitly.
    #[serde(rename = "securityEnabled")]
    security_enabled: Option<bool>,
}

async fn chat(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(req)) = payload else {
        return reply(StatusCode::BAD_REQUEST, "Invalid request");
    };
    let security_enabled = req.security_enabled.unwrap_or(true);

    // 1) Guard the prompt
    if security_enabled {
        match ctx.guard.check("prompt", &req.message).await {
            Ok(GuardDecision::Block { reason }) => {
                info!(reason = reason.as_deref().unwrap_or(""), "prompt blocked");
                return reply(StatusCode::FORBIDDEN, "Blocked: content policy");
            }
            Ok(_) => {}
            Err(e) => {
                error!(err = %e, "prompt guard check failed");
                return reply(StatusCode::INTERNAL_SERVER_ERROR, "Error checking policy");
            }
        }
    }

    // 2) Stream from the LLM runtime and assemble the reply
    let prompt = format!("{} {}", ctx.config.chat.system_prompt, req.message);
    let response = match ctx.ollama.generate(&prompt).await {
        Ok(r) => r,
        Err(OllamaError::Request(e)) => {
            error!(err = %e, "LLM request failed");
            return reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to call LLM");
        }
        Err(OllamaError::Stream(e)) => {
            error!(err = %e, "LLM stream read failed");
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error reading LLM response",
            );
        }
    };

    // 3) Guard the assembled response as well
    if security_enabled {
        match ctx.guard.check("response", &response).await {
            Ok(GuardDecision::Block { reason }) => {
                info!(reason = reason.as_deref().unwrap_or(""), "response blocked");
                return reply(StatusCode::FORBIDDEN, "Blocked: content policy");
            }
            Ok(_) => {}
            Err(e) => {
                error!(err = %e, "response guard check failed");
                return reply(StatusCode::INTERNAL_SERVER_ERROR, "Error checking policy");
            }
        }
    }

    (StatusCode::OK, Json(json!({ "response": response })))
}

fn reply(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "response": message })))
}
