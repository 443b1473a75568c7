//! Webhook HTTP surface: `POST`, `GET` and `OPTIONS` on `/api/telegram`.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::bot::Relay;
use crate::config::{Config, WebhookConfig};
use crate::platform::{IncomingMessage, TelegramApi};

pub const WEBHOOK_PATH: &str = "/api/telegram";

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

// ── Shared state ───────────────────────────────────────────────────────────────

pub struct AppState {
    pub relay: Arc<Relay>,
    pub telegram: Arc<dyn TelegramApi>,
    pub config: Config,
}

#[derive(Debug, Deserialize)]
struct WebhookQuery {
    action: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            WEBHOOK_PATH,
            get(handle_get).post(handle_post).options(handle_options),
        )
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.server.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {}{}", addr, WEBHOOK_PATH);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

// ── Handlers ───────────────────────────────────────────────────────────────────

fn ok() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ok": true })))
}

fn failure(status: StatusCode, error: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "ok": false, "error": error.to_string() })))
}

/// Always 200 once the update is understood; processing failures are
/// reported in the chat or logged so Telegram never redelivers because of them.
async fn handle_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if let Some(expected) = state.config.webhook.secret_token.as_deref() {
        let provided = headers
            .get(SECRET_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        if !constant_time_eq(expected.as_bytes(), provided) {
            warn!("Telegram webhook secret mismatch");
            return failure(StatusCode::UNAUTHORIZED, "invalid secret token");
        }
    }

    let update: Value = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            error!("Webhook body is not JSON: {}", e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    let message = match update.get("message") {
        None | Some(Value::Null) => {
            debug!("Update without message, ignoring");
            return ok();
        }
        Some(raw) => match IncomingMessage::deserialize(raw) {
            Ok(message) => message,
            Err(e) => {
                error!("Malformed message in update: {}", e);
                return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
            }
        },
    };

    if state.config.webhook.detach_processing {
        let relay = Arc::clone(&state.relay);
        tokio::spawn(async move { relay.handle_message(&message).await });
    } else {
        state.relay.handle_message(&message).await;
    }
    ok()
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let action = query.action.as_deref().map(str::to_ascii_lowercase);

    match action.as_deref() {
        None | Some("") => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": "Telegram bot API is running",
                "time": chrono::Utc::now().to_rfc3339(),
            })),
        ),
        Some("info") => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "bot_token_configured": state.config.has_bot_token(),
                "ai_credentials_configured": state.config.has_ai_credentials(),
                "ai_provider_ready": state.relay.has_ai_provider(),
                "public_url_configured": state.config.webhook.public_url.is_some(),
                "webhook_secret_configured": state.config.webhook.secret_token.is_some(),
            })),
        ),
        Some("setwebhook") => set_webhook(&state, &headers).await,
        Some(other) => {
            debug!("Unknown action: {}", other);
            failure(StatusCode::BAD_REQUEST, "unknown action")
        }
    }
}

async fn set_webhook(state: &AppState, headers: &HeaderMap) -> (StatusCode, Json<Value>) {
    let Some(url) = webhook_url(&state.config.webhook, headers) else {
        return failure(StatusCode::BAD_REQUEST, "cannot determine public URL");
    };

    info!("Registering webhook at {}", url);
    let secret = state.config.webhook.secret_token.as_deref();
    match state.telegram.set_webhook(&url, secret).await {
        Ok(mut response) => {
            if let Some(fields) = response.as_object_mut() {
                fields.insert("url".to_string(), Value::String(url));
            }
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            error!("setWebhook failed: {:#}", e);
            failure(StatusCode::BAD_GATEWAY, format!("{e:#}"))
        }
    }
}

async fn handle_options() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, GET, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `<public_url>/api/telegram` when configured, otherwise
/// `<x-forwarded-proto>://<host>/api/telegram` from the request.
pub fn webhook_url(config: &WebhookConfig, headers: &HeaderMap) -> Option<String> {
    if let Some(base) = config.public_url.as_deref().filter(|u| !u.is_empty()) {
        return Some(format!("{}{}", base.trim_end_matches('/'), WEBHOOK_PATH));
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("https");

    Some(format!("{proto}://{host}{WEBHOOK_PATH}"))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
