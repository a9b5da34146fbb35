//! HTTP deployment of the request bridge
//!
//! Two POST endpoints accept the bridge envelopes; a health endpoint reports
//! whether background skill discovery has finished. Early tool calls block on
//! that discovery rather than failing.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::bridge::Bridge;
use crate::error::McpError;
use crate::manager::McpManager;

/// Progress of the background sync pass
#[derive(Debug, Clone)]
pub enum SyncState {
    /// Discovery still running; calls wait
    Pending,
    /// Skills generated; calls proceed
    Ready,
    /// Discovery failed; calls surface the detail as their own error
    Failed(String),
}

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    bridge: Arc<Bridge>,
    manager: Arc<McpManager>,
    sync_state: watch::Receiver<SyncState>,
}

impl AppState {
    pub fn new(manager: Arc<McpManager>, sync_state: watch::Receiver<SyncState>) -> Self {
        Self {
            bridge: Arc::new(Bridge::new(manager.clone())),
            manager,
            sync_state,
        }
    }
}

/// Build the router over the app state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .route("/mcp", post(raw_mcp))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until the listener closes
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), McpError> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Skill bridge listening");
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// POST /invoke: tool-call envelopes
async fn invoke(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if payload.get("tool_name").is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "request missing tool_name"})),
        );
    }
    dispatch(&state, payload).await
}

/// POST /mcp: raw method envelopes
async fn raw_mcp(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if payload.get("method").is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "request missing method"})),
        );
    }
    dispatch(&state, payload).await
}

async fn dispatch(state: &AppState, payload: Value) -> (StatusCode, Json<Value>) {
    if let Err(detail) = wait_until_ready(state.sync_state.clone()).await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": detail})),
        );
    }
    match state.bridge.handle_request(&payload).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": e.to_string()})),
        ),
    }
}

/// Block until background discovery finishes.
async fn wait_until_ready(mut rx: watch::Receiver<SyncState>) -> Result<(), String> {
    loop {
        let current = rx.borrow().clone();
        match current {
            SyncState::Ready => return Ok(()),
            SyncState::Failed(detail) => return Err(detail),
            SyncState::Pending => {
                if rx.changed().await.is_err() {
                    return Err("skill sync ended before completing".into());
                }
            }
        }
    }
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = match &*state.sync_state.borrow() {
        SyncState::Pending => "starting",
        SyncState::Ready => "ready",
        SyncState::Failed(_) => "failed",
    };
    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "backends": state.manager.backend_ids().len(),
        "tools": state.manager.cached_tool_count(),
    }))
}
