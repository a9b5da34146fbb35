//! Request bridge translating JSON envelopes into backend dispatches

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::McpError;
use crate::manager::McpManager;

/// Stateless façade between caller-facing JSON envelopes and the manager.
///
/// Requests carry a `backend_id` plus either a `tool_name` (tool call) or a
/// `method` (raw passthrough). Every failure, validation or dispatch alike,
/// comes back as an error envelope; nothing propagates past this boundary.
pub struct Bridge {
    manager: Arc<McpManager>,
}

impl Bridge {
    pub fn new(manager: Arc<McpManager>) -> Self {
        Self { manager }
    }

    /// Validate and dispatch one request envelope.
    ///
    /// All validation happens before any dispatch reaches a backend.
    pub async fn handle_request(&self, payload: &Value) -> Result<Value, McpError> {
        let envelope = payload
            .as_object()
            .ok_or_else(|| McpError::Validation("payload must be an object".into()))?;

        let backend_id = envelope
            .get("backend_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| McpError::Validation("request missing backend_id".into()))?;

        if envelope.contains_key("tool_name") {
            let tool_name = envelope
                .get("tool_name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| McpError::Validation("request missing tool_name".into()))?;
            let arguments = optional_object(envelope.get("arguments"), "arguments")?;

            debug!(backend_id = %backend_id, tool = %tool_name, "Bridging tool call");
            let result = self.manager.call_tool(backend_id, tool_name, arguments).await?;
            return Ok(json!({"status": "ok", "result": result}));
        }

        if envelope.contains_key("method") {
            let method = envelope
                .get("method")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| McpError::Validation("request missing method".into()))?;
            let params = optional_object(envelope.get("params"), "params")?;

            debug!(backend_id = %backend_id, method = %method, "Bridging raw request");
            let result = self.manager.request(backend_id, method, params).await?;
            return Ok(json!({"status": "ok", "result": result}));
        }

        Err(McpError::Validation(
            "request must include tool_name or method".into(),
        ))
    }

    /// JSON-string façade: always answers with well-formed JSON.
    pub async fn handle_request_json(&self, raw: &str) -> String {
        let payload: Value = match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(_) => return error_envelope("invalid_json"),
        };
        match self.handle_request(&payload).await {
            Ok(response) => serde_json::to_string(&response)
                .unwrap_or_else(|_| error_envelope("response serialization failed")),
            Err(e) => error_envelope(&e.to_string()),
        }
    }
}

fn optional_object(value: Option<&Value>, field: &str) -> Result<Value, McpError> {
    match value {
        None | Some(Value::Null) => Ok(json!({})),
        Some(v) if v.is_object() => Ok(v.clone()),
        Some(_) => Err(McpError::Validation(format!("{field} must be an object"))),
    }
}

fn error_envelope(detail: &str) -> String {
    serde_json::to_string(&json!({"status": "error", "detail": detail}))
        .unwrap_or_else(|_| String::from(r#"{"status":"error","detail":"internal"}"#))
}
