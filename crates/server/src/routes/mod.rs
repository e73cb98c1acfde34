use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use cadlink_host::command;
use serde_json::{json, Value};
use shared::{ToolRequest, ToolResponse};

use crate::AppState;

/// Health check
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "host_running": state.bridge.is_running(),
        "queued": state.bridge.queued(),
    }))
}

/// Static tool table
pub async fn list_tools() -> Json<Value> {
    Json(json!({ "success": true, "tools": command::tools_json() }))
}

/// Run one tool on the host thread
pub async fn call_tool(
    State(state): State<AppState>,
    Json(request): Json<ToolRequest>,
) -> Result<Json<ToolResponse>, StatusCode> {
    let response = tokio::task::spawn_blocking(move || command::dispatch(&state.bridge, request))
        .await
        .map_err(|e| {
            tracing::error!("Tool task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(response))
}
