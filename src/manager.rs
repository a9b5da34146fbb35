//! MCP connection manager

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::BackendConfig;
use crate::connection::McpConnection;
use crate::error::McpError;
use crate::transport::DEFAULT_REQUEST_TIMEOUT;
use crate::types::ToolSchema;

/// Manages lazily constructed connections to multiple MCP backends
pub struct McpManager {
    /// Backend configuration by id, fixed at construction
    backends: HashMap<String, BackendConfig>,
    /// Live connections by backend id
    connections: Mutex<HashMap<String, Arc<McpConnection>>>,
    /// Last discovered tool schemas per backend
    tool_cache: RwLock<HashMap<String, Vec<ToolSchema>>>,
    /// Bound applied to every request issued through clients built here
    request_timeout: Duration,
}

impl McpManager {
    /// Create a manager over a set of backend configs
    pub fn new(configs: Vec<BackendConfig>) -> Self {
        Self::with_timeout(configs, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a manager with a non-default request timeout
    pub fn with_timeout(configs: Vec<BackendConfig>, request_timeout: Duration) -> Self {
        let backends = configs.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            backends,
            connections: Mutex::new(HashMap::new()),
            tool_cache: RwLock::new(HashMap::new()),
            request_timeout,
        }
    }

    /// Configured backend ids, sorted
    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get the cached client for a backend, constructing it on first use.
    ///
    /// Construction resolves the transport kind, validates the required
    /// field, spawns/builds the transport and runs the best-effort handshake.
    /// A failed handshake is logged and the connection stays usable.
    pub async fn get_client(&self, backend_id: &str) -> Result<Arc<McpConnection>, McpError> {
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections.get(backend_id) {
            return Ok(connection.clone());
        }

        let config = self
            .backends
            .get(backend_id)
            .ok_or_else(|| McpError::BackendNotFound(backend_id.to_string()))?;

        info!(backend_id = %backend_id, "Connecting to MCP backend");
        let connection = Arc::new(McpConnection::connect(config, self.request_timeout).await?);

        if let Err(e) = connection.initialize().await {
            warn!(backend_id = %backend_id, error = %e, "initialize failed, continuing without handshake");
        }

        connections.insert(backend_id.to_string(), connection.clone());
        Ok(connection)
    }

    /// List tools from a backend, refreshing the tool cache
    pub async fn list_tools(&self, backend_id: &str) -> Result<Vec<ToolSchema>, McpError> {
        let connection = self.get_client(backend_id).await?;
        let tools = connection.list_tools().await?;
        self.tool_cache
            .write()
            .insert(backend_id.to_string(), tools.clone());
        Ok(tools)
    }

    /// Total number of tools across all discovered backends
    pub fn cached_tool_count(&self) -> usize {
        self.tool_cache.read().values().map(Vec::len).sum()
    }

    /// Call a tool on a backend
    pub async fn call_tool(
        &self,
        backend_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let connection = self.get_client(backend_id).await?;
        connection.call_tool(tool_name, arguments).await
    }

    /// Pass an arbitrary method through to a backend
    pub async fn request(
        &self,
        backend_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let connection = self.get_client(backend_id).await?;
        connection.request(method, params).await
    }

    /// Shut down every live connection
    pub async fn shutdown(&self) {
        let mut connections = self.connections.lock().await;
        for (backend_id, connection) in connections.drain() {
            if let Err(e) = connection.shutdown().await {
                warn!(backend_id = %backend_id, error = %e, "Failed to shut down connection");
            }
        }
        self.tool_cache.write().clear();
    }
}
