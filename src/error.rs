//! Bridge error types

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while bridging MCP backends
#[derive(Debug, Error)]
pub enum McpError {
    /// Backend id not present in the loaded settings
    #[error("Unknown backend: {0}")]
    BackendNotFound(String),

    /// Connection has been shut down
    #[error("Not connected to MCP backend")]
    NotConnected,

    /// Malformed or incomplete backend settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport error (unavailable stream, closed process, network failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error (malformed remote JSON, mismatched correlation id)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Explicit JSON-RPC error object in a response
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Non-2xx HTTP status from a backend
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// No correlated response within the configured bound
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed bridge request envelope
    #[error("{0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
