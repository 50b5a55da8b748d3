// SPDX-License-Identifier: MIT
//! The AI relay endpoint.
//!
//! `POST /api/ai` takes `{prompt, type}`, forwards the prompt to the
//! configured OpenAI-compatible completion endpoint with a fixed system
//! instruction and fixed sampling parameters, and relays the first choice
//! back as `{result, type, success}`. Stateless: no retries, no streaming,
//! no rate limiting — the caller enforces its own daily quota. CORS is open
//! to any origin; only POST/OPTIONS are accepted.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use super::{AiErrorBody, AiRequest, AiResponse};
use crate::config::AiConfig;

/// Fixed system instruction sent with every relayed prompt.
const SYSTEM_INSTRUCTION: &str =
    "You are an expert consultant helping users validate business ideas. \
     Always follow the requested JSON format exactly.";
const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 2000;

pub struct ProxyState {
    pub http: reqwest::Client,
    pub ai: AiConfig,
    pub api_key: Option<String>,
}

impl ProxyState {
    pub fn new(ai: AiConfig, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            ai,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub fn build_router(state: Arc<ProxyState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/ai", post(relay))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: Arc<ProxyState>, bind_address: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    let router = build_router(state);
    info!("AI proxy listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn relay(
    State(state): State<Arc<ProxyState>>,
    Json(body): Json<AiRequest>,
) -> Result<Json<AiResponse>, (StatusCode, Json<AiErrorBody>)> {
    if body.prompt.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Prompt is required", None));
    }

    let Some(api_key) = state.api_key.as_deref() else {
        error!("AI relay called without a configured provider key");
        return Err(reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "AI provider key is not configured",
            None,
        ));
    };

    let payload = json!({
        "model": state.ai.model,
        "messages": [
            { "role": "system", "content": SYSTEM_INSTRUCTION },
            { "role": "user", "content": body.prompt },
        ],
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS,
    });

    let response = state
        .http
        .post(&state.ai.upstream_url)
        .bearer_auth(api_key)
        .json(&payload)
        .send()
        .await
        .map_err(|e| {
            error!(err = %e, "completion API unreachable");
            reject(
                StatusCode::BAD_GATEWAY,
                "AI request failed",
                Some(e.to_string()),
            )
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        error!(%status, detail = %detail, "completion API error");
        return Err(reject(
            StatusCode::BAD_GATEWAY,
            "AI request failed",
            Some(format!("upstream status {status}")),
        ));
    }

    let chat: ChatResponse = response.json().await.map_err(|e| {
        error!(err = %e, "unparseable completion API response");
        reject(
            StatusCode::BAD_GATEWAY,
            "AI request failed",
            Some(e.to_string()),
        )
    })?;

    let result = chat
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| {
            reject(
                StatusCode::BAD_GATEWAY,
                "AI request failed",
                Some("empty choices".to_string()),
            )
        })?;

    Ok(Json(AiResponse {
        result,
        kind: body.kind,
        success: true,
    }))
}

fn reject(
    status: StatusCode,
    message: &str,
    details: Option<String>,
) -> (StatusCode, Json<AiErrorBody>) {
    (
        status,
        Json(AiErrorBody {
            error: message.to_string(),
            details,
        }),
    )
}
