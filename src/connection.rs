//! Single MCP backend connection

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::McpError;
use crate::transport::{create_transport, McpTransport};
use crate::types::{parse_tools, ServerInfo, ToolSchema};

/// Protocol version sent during the handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Connection to a single MCP backend
///
/// The transport lives behind a mutex, so calls through one connection are
/// serialized: at most one request is in flight at a time.
#[derive(Debug)]
pub struct McpConnection {
    /// Backend id, for logging
    backend_id: String,
    /// Transport layer; `None` after shutdown
    transport: Mutex<Option<Box<dyn McpTransport>>>,
    /// Correlation id counter
    request_id: AtomicU64,
}

impl McpConnection {
    /// Construct the transport for a backend and wrap it in a connection.
    pub async fn connect(
        config: &BackendConfig,
        timeout: std::time::Duration,
    ) -> Result<Self, McpError> {
        let transport = create_transport(config, timeout).await?;
        Ok(Self {
            backend_id: config.id.clone(),
            transport: Mutex::new(Some(transport)),
            request_id: AtomicU64::new(1),
        })
    }

    /// Perform the MCP handshake: an `initialize` request followed by an
    /// `initialized` notification.
    ///
    /// Callers treat failure as non-fatal; backends that predate the
    /// handshake still answer tool calls.
    pub async fn initialize(&self) -> Result<(), McpError> {
        let result = self
            .send_request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "skillbridge",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;

        if let Ok(server_info) = serde_json::from_value::<ServerInfo>(result) {
            info!(
                backend_id = %self.backend_id,
                server_name = %server_info.name,
                "MCP backend initialized"
            );
        }

        self.send_notification("initialized", serde_json::json!({}))
            .await
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<ToolSchema>, McpError> {
        let result = self.send_request("tools/list", serde_json::json!({})).await?;
        let tools = parse_tools(&result);
        debug!(backend_id = %self.backend_id, num_tools = tools.len(), "Listed tools");
        Ok(tools)
    }

    /// Call a tool
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        debug!(backend_id = %self.backend_id, tool = %name, "Calling tool");
        self.send_request(
            "tools/call",
            serde_json::json!({
                "name": name,
                "arguments": arguments
            }),
        )
        .await
    }

    /// Send an arbitrary method passthrough
    pub async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        self.send_request(method, params).await
    }

    /// Shutdown the connection
    pub async fn shutdown(&self) -> Result<(), McpError> {
        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await?;
        }
        info!(backend_id = %self.backend_id, "MCP connection shutdown");
        Ok(())
    }

    /// Send a JSON-RPC request and extract its result
    async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let transport = self.transport.lock().await;
        let transport = transport.as_ref().ok_or(McpError::NotConnected)?;

        let response = transport.send_request(request).await?;

        if let Some(error) = response.get("error") {
            return Err(McpError::Rpc {
                code: error["code"].as_i64().unwrap_or(-1),
                message: error["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            });
        }

        Ok(response.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Send a JSON-RPC notification (no response expected)
    async fn send_notification(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), McpError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });

        let transport = self.transport.lock().await;
        let transport = transport.as_ref().ok_or(McpError::NotConnected)?;

        transport.send_notification(notification).await
    }
}
