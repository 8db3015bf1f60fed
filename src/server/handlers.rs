use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::AppState;
use crate::error::ApiError;
use crate::executor::{ExecuteRequest, ExecuteResponse};

pub const SERVICE_ID: &str = "e2b-code-execution-api";
pub const SERVICE_TITLE: &str = "E2B Code Execution API";

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_ID
    }))
}

/// Service metadata and endpoint list
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let templates: Vec<Value> = state
        .chain
        .candidates()
        .iter()
        .map(|c| json!({ "id": c.id, "description": c.description }))
        .collect();

    Json(json!({
        "service": SERVICE_TITLE,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/health": "Health check",
            "/execute": "Execute Python code (POST)",
            "/docs": "API documentation"
        },
        "template": state.config.template_id,
        "templates": templates
    }))
}

/// Machine-readable description of the API
pub async fn docs(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": SERVICE_TITLE,
            "description": "Execute Python code safely in E2B sandboxes",
            "version": env!("CARGO_PKG_VERSION")
        },
        "paths": {
            "/health": { "get": { "summary": "Health check" } },
            "/": { "get": { "summary": "Service information" } },
            "/execute": {
                "post": {
                    "summary": "Execute Python code in an E2B sandbox",
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/CodeRequest" } } }
                    },
                    "responses": {
                        "200": {
                            "description": "Execution result",
                            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/CodeResponse" } } }
                        },
                        "422": { "description": "Validation error" },
                        "500": { "description": "Service not configured" }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "CodeRequest": {
                    "type": "object",
                    "required": ["code"],
                    "properties": {
                        "code": { "type": "string" },
                        "timeout": {
                            "type": "integer",
                            "default": crate::executor::DEFAULT_TIMEOUT_SECS,
                            "minimum": 1,
                            "maximum": state.config.max_timeout_secs
                        }
                    }
                },
                "CodeResponse": {
                    "type": "object",
                    "required": ["success", "output"],
                    "properties": {
                        "success": { "type": "boolean" },
                        "output": { "type": "string" },
                        "error": { "type": "string", "nullable": true },
                        "execution_time": { "type": "number", "nullable": true }
                    }
                }
            }
        }
    }))
}

/// Run code in a hosted sandbox
pub async fn execute_code(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    let executor = state
        .executor
        .as_ref()
        .ok_or(ApiError::NotConfigured("E2B_API_KEY"))?;

    let timeout = request.timeout_secs();
    if timeout == 0 {
        return Err(ApiError::Validation(
            "timeout must be at least 1 second".into(),
        ));
    }
    if timeout > state.config.max_timeout_secs {
        return Err(ApiError::Validation(format!(
            "timeout must be at most {} seconds",
            state.config.max_timeout_secs
        )));
    }

    info!(
        "Received execute request: {} bytes of code, timeout={}s",
        request.code.len(),
        timeout
    );
    let response = executor.execute(&request.code, timeout).await;
    if let Some(error) = &response.error {
        warn!("Execution failed: {}", error);
    }

    Ok(Json(response))
}
