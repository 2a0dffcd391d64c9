//! HTTP ingress: authenticated content submission plus read-only status
//! endpoints. New items are created in the store and immediately sent for
//! approval.

use crate::approval::ApprovalOrchestrator;
use crate::db::{self, Pool};
use crate::dispatch::{rejected_continuation, DispatchEngine};
use crate::model::{NewItem, Priority};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub orchestrator: Arc<ApprovalOrchestrator>,
    pub engine: Arc<DispatchEngine>,
    pub secret: String,
    pub enabled_channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentPayload {
    pub topic: String,
    pub summary: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/content", post(receive_content))
        .route("/v1/items", get(list_items))
        .route("/v1/stats", get(get_stats))
        .with_state(state)
}

pub async fn serve(
    state: AppState,
    bind: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind webhook listener on {bind}"))?;
    info!(%bind, "webhook listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

/// Verify the `X-Signature` header: hex HMAC-SHA256 of the payload under the
/// shared webhook secret.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&computed, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn signature_of(headers: &HeaderMap) -> String {
    headers
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match db::stats(&state.pool).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "channels": state.enabled_channels,
                "stats": stats,
            })),
        ),
        Err(err) => {
            error!(?err, "health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error" })),
            )
        }
    }
}

async fn receive_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if !verify_signature(&body, &signature_of(&headers), &state.secret) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid signature" })),
        );
    }

    let payload: ContentPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid JSON: {err}") })),
            )
        }
    };
    if payload.topic.trim().is_empty() || payload.summary.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "topic and summary are required" })),
        );
    }
    let priority = match &payload.priority {
        None => Priority::Normal,
        Some(p) => match Priority::parse(p) {
            Some(priority) => priority,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "priority must be high, normal or low" })),
                )
            }
        },
    };

    let new_item = NewItem {
        topic: payload.topic,
        summary: payload.summary,
        body: payload.body.filter(|s| !s.is_empty()),
        link: payload.link.filter(|s| !s.is_empty()),
        image_url: payload.image_url.filter(|s| !s.is_empty()),
        video_url: payload.video_url.filter(|s| !s.is_empty()),
        priority,
        source: payload.source.unwrap_or_else(|| "webhook".into()),
        not_before: payload.not_before,
    };

    let item_id = match db::create_item(&state.pool, &new_item, &state.enabled_channels).await {
        Ok(id) => id,
        Err(err) => {
            error!(?err, "failed to create item");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            );
        }
    };
    info!(item_id, topic = %new_item.topic, "item created via webhook");

    match state
        .orchestrator
        .request_approval(
            item_id,
            state.engine.approved_continuation(),
            rejected_continuation(),
        )
        .await
    {
        Ok(true) => {}
        Ok(false) => warn!(item_id, "approval request not sent; item stays pending"),
        Err(err) => error!(?err, item_id, "approval request failed"),
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "item_id": item_id,
            "message": "item created and sent for approval",
        })),
    )
}

async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    // Read requests are signed over the literal request line.
    if !verify_signature(b"GET /v1/items", &signature_of(&headers), &state.secret) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid signature" })),
        );
    }
    match db::recent_items(&state.pool, 20).await {
        Ok(items) => {
            let items: Vec<Value> = items
                .into_iter()
                .map(|(item, attempts)| json!({ "item": item, "attempts": attempts }))
                .collect();
            (StatusCode::OK, Json(json!({ "items": items })))
        }
        Err(err) => {
            error!(?err, "failed to list items");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
        }
    }
}

async fn get_stats(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match db::stats(&state.pool).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))),
        Err(err) => {
            error!(?err, "failed to compute stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
        }
    }
}
