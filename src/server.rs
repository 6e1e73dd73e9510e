//! server.rs - JSON status API
//!
//! Thin presentation shell over the core: read-only views of the canonical
//! model, the message log and connection state, plus the operator clear
//! command. Rendering, styling and localized text live elsewhere.

use crate::connection::{ConnectionManager, ConnectionState};
use crate::hub::WaterHub;
use anyhow::Result;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<WaterHub>,
    pub connection: Arc<ConnectionManager>,
    pub reload_interval_secs: u64,
}

pub async fn run(bind: &str, state: ApiState) -> Result<()> {
    let app = Router::new()
        .route("/api/state", get(model_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/status", get(status_handler))
        .route("/api/clear", post(clear_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// current canonical model
async fn model_handler(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let model = state.hub.model_snapshot().await;
    Json(serde_json::to_value(model).unwrap_or_default())
}

/// message log snapshot, newest first
async fn messages_handler(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let messages = state.hub.messages_snapshot().await;
    Json(serde_json::to_value(messages).unwrap_or_default())
}

#[derive(Serialize)]
struct StatusResponse {
    connection: ConnectionState,
    stored_keys: usize,
    reload_interval_secs: u64,
}

/// connectivity and storage status
async fn status_handler(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connection: state.connection.state().await,
        stored_keys: state.hub.store().key_count(),
        reload_interval_secs: state.reload_interval_secs,
    })
}

/// operator command: atomic reset of store, model and log
async fn clear_handler(State(state): State<ApiState>) -> Json<serde_json::Value> {
    state.hub.clear().await;
    Json(serde_json::json!({"status": "ok", "action": "clear"}))
}
