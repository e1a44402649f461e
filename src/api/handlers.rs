use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::tools::{find_tool, invoke, ToolContext, ToolSpec, TOOLS};

/// Application state shared across handlers
pub struct AppState {
    pub tools: ToolContext,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Serialize)]
pub struct ToolsResponse {
    pub tools: &'static [ToolSpec],
}

pub async fn list_tools() -> Json<ToolsResponse> {
    Json(ToolsResponse { tools: TOOLS })
}

/// Run a tool. Tool-level failures come back as a 200 with an error
/// payload; only unknown tools and malformed bodies are HTTP errors.
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(tool) = find_tool(&name) else {
        return Err(ApiError::NotFound(format!("Tool '{}' not found", name)));
    };

    let args = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON arguments: {}", e)))?
    };

    tracing::debug!(tool = tool.name, "Invoking tool");
    Ok(Json(invoke(&state.tools, tool.name, args).await))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
