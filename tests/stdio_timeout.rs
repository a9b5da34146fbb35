//! Live stdio transport behavior against real child processes.

#![cfg(unix)]

use std::time::{Duration, Instant};

use skillbridge::config::BackendConfig;
use skillbridge::error::McpError;
use skillbridge::manager::McpManager;

fn stdio_backend(id: &str, command: &str, args: &[&str]) -> BackendConfig {
    BackendConfig {
        id: id.into(),
        command: Some(command.into()),
        args: args.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn backend_that_never_responds_fails_within_the_bound() {
    let configs = vec![stdio_backend("sleeper", "sleep", &["30"])];
    let manager = McpManager::with_timeout(configs, Duration::from_millis(200));

    let start = Instant::now();
    let err = manager
        .call_tool("sleeper", "anything", serde_json::json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, McpError::Timeout(_)), "got: {err}");
    // One timed-out handshake plus one timed-out call, far below the
    // child's own lifetime.
    assert!(start.elapsed() < Duration::from_secs(5));

    manager.shutdown().await;
}

#[tokio::test]
async fn backend_that_exits_fails_instead_of_hanging() {
    let configs = vec![stdio_backend("quitter", "true", &[])];
    let manager = McpManager::with_timeout(configs, Duration::from_secs(5));

    let start = Instant::now();
    let result = manager
        .call_tool("quitter", "anything", serde_json::json!({}))
        .await;

    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_secs(5));

    manager.shutdown().await;
}

#[tokio::test]
async fn echoed_envelopes_are_correlated_by_id() {
    // `cat` echoes every request line back, so the reader sees its own
    // envelope: same id, no error member, no result. The echoed handshake
    // notification (no id) must be dropped on the way to the next match.
    let configs = vec![stdio_backend("echo", "cat", &[])];
    let manager = McpManager::with_timeout(configs, Duration::from_secs(5));

    let result = manager
        .request("echo", "ping", serde_json::json!({}))
        .await
        .unwrap();
    assert!(result.is_null());

    manager.shutdown().await;
}
