//! MCP transport implementations

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::config::{BackendConfig, TransportKind};
use crate::error::McpError;

/// Default bound on waiting for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport trait for MCP communication
#[async_trait]
pub trait McpTransport: Send + Sync + std::fmt::Debug {
    /// Send a request envelope and wait for the correlated response envelope
    async fn send_request(&self, request: serde_json::Value) -> Result<serde_json::Value, McpError>;

    /// Send a notification (no response awaited)
    async fn send_notification(&self, notification: serde_json::Value) -> Result<(), McpError>;

    /// Close the transport
    async fn close(self: Box<Self>) -> Result<(), McpError>;
}

/// Create a transport from a backend config
pub async fn create_transport(
    config: &BackendConfig,
    timeout: Duration,
) -> Result<Box<dyn McpTransport>, McpError> {
    match config.transport_kind()? {
        TransportKind::Stdio => {
            let command = config.command.as_deref().ok_or_else(|| {
                McpError::Configuration(format!("Missing command for stdio backend {}", config.id))
            })?;
            let transport = StdioTransport::spawn(command, &config.args, &config.env, timeout).await?;
            Ok(Box::new(transport))
        }
        TransportKind::Http => {
            let url = http_url(config)?;
            Ok(Box::new(HttpTransport::new(url, &config.headers, false, timeout)?))
        }
        TransportKind::Sse => {
            let url = http_url(config)?;
            Ok(Box::new(HttpTransport::new(url, &config.headers, true, timeout)?))
        }
    }
}

fn http_url(config: &BackendConfig) -> Result<&str, McpError> {
    config.url.as_deref().ok_or_else(|| {
        McpError::Configuration(format!("Missing url for http backend {}", config.id))
    })
}

/// Stdio-based transport (spawns a child process)
#[derive(Debug)]
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    /// Stdout lines, fed by the background reader until EOF
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    timeout: Duration,
}

impl StdioTransport {
    /// Spawn the backend process and start its background readers.
    ///
    /// The child sees the parent environment merged with the configured
    /// variables. One reader frames stdout into lines for correlation; a
    /// second drains stderr into the log.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        debug!(command = %command, "Starting MCP backend process");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Transport(format!("Failed to spawn: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("No stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("No stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::Transport("No stderr".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
            // tx drops here; a closed channel tells waiters the stream ended
        });
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = %line, "mcp-stderr");
            }
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            lines: Mutex::new(rx),
            timeout,
        })
    }

    async fn write_line(&self, payload: &serde_json::Value) -> Result<(), McpError> {
        let encoded = serde_json::to_string(payload)
            .map_err(|e| McpError::Protocol(format!("JSON error: {e}")))?;

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(encoded.as_bytes())
            .await
            .map_err(|e| McpError::Transport(format!("Write error: {e}")))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| McpError::Transport(format!("Write error: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(format!("Flush error: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, request: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let id = request
            .get("id")
            .cloned()
            .ok_or_else(|| McpError::Protocol("request envelope missing id".into()))?;

        self.write_line(&request).await?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut lines = self.lines.lock().await;
        loop {
            let line = match tokio::time::timeout_at(deadline, lines.recv()).await {
                Err(_) => return Err(McpError::Timeout(self.timeout)),
                Ok(None) => {
                    return Err(McpError::Transport(
                        "backend stdout closed while awaiting response".into(),
                    ))
                }
                Ok(Some(line)) => line,
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Unparseable lines and mismatched ids are dropped, never requeued.
            let message: serde_json::Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if message.get("id") != Some(&id) {
                continue;
            }
            return Ok(message);
        }
    }

    async fn send_notification(&self, notification: serde_json::Value) -> Result<(), McpError> {
        self.write_line(&notification).await
    }

    async fn close(self: Box<Self>) -> Result<(), McpError> {
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
        Ok(())
    }
}

/// HTTP transport, posting one JSON-RPC envelope per request.
///
/// In SSE mode the response body is an event stream and the first JSON
/// `data:` payload is the response.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    sse: bool,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        url: &str,
        headers: &HashMap<String, String>,
        sse: bool,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        let accept = if sse {
            "text/event-stream"
        } else {
            "application/json, text/event-stream"
        };
        header_map.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(accept),
        );
        for (key, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| McpError::Configuration(format!("Invalid header name {key:?}: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| McpError::Configuration(format!("Invalid header value for {key}: {e}")))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            sse,
            timeout,
        })
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<String, McpError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    McpError::Timeout(self.timeout)
                } else {
                    McpError::Transport(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(format!("Failed to read HTTP body: {e}")))?;
        if !status.is_success() {
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, request: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let id = request
            .get("id")
            .cloned()
            .ok_or_else(|| McpError::Protocol("request envelope missing id".into()))?;

        let body = self.post(&request).await?;
        let response = if self.sse {
            parse_sse_body(&body)?
        } else {
            serde_json::from_str(&body)
                .map_err(|_| McpError::Protocol("Invalid JSON response from backend".into()))?
        };

        if response.get("id") != Some(&id) {
            return Err(McpError::Protocol("mismatched response id".into()));
        }
        Ok(response)
    }

    async fn send_notification(&self, notification: serde_json::Value) -> Result<(), McpError> {
        // Notifications carry no id; whatever the endpoint answers is discarded.
        self.post(&notification).await.map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<(), McpError> {
        Ok(())
    }
}

/// Extract the response envelope from an SSE-framed body.
///
/// Scans for `data:` lines, skipping blanks and `[DONE]` sentinels; the first
/// line that parses as JSON wins. Some servers answer a plain JSON document
/// on the same endpoint, so the whole body is tried as a fallback.
pub(crate) fn parse_sse_body(body: &str) -> Result<serde_json::Value, McpError> {
    for line in body.lines() {
        let Some(payload) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        if let Ok(value) = serde_json::from_str(payload) {
            return Ok(value);
        }
    }
    serde_json::from_str(body.trim())
        .map_err(|_| McpError::Protocol("No JSON payload in SSE response".into()))
}
