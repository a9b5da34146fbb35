//! Backend settings loading and transport resolution

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::McpError;

/// `${NAME}` placeholders in the raw settings text.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("placeholder regex is valid"));

/// Wire transport for one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Local subprocess speaking line-delimited JSON-RPC
    Stdio,
    /// Plain HTTP POST per request
    Http,
    /// HTTP POST answered as a server-sent-event stream
    Sse,
}

/// Configuration for a single MCP backend
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// Backend id (the `mcpServers` key)
    pub id: String,
    /// Executable for stdio backends
    pub command: Option<String>,
    /// Arguments for the executable
    pub args: Vec<String>,
    /// Extra environment for the child process
    pub env: HashMap<String, String>,
    /// Endpoint for http/sse backends
    pub url: Option<String>,
    /// Explicit transport hint
    pub transport: Option<String>,
    /// Legacy type hint, lower precedence than `transport`
    pub type_hint: Option<String>,
    /// Extra HTTP headers
    pub headers: HashMap<String, String>,
    /// Explicit enable flag; overrides `disabled` when present
    pub enabled: Option<bool>,
    /// Legacy disable flag
    pub disabled: bool,
}

impl BackendConfig {
    /// Whether this backend participates in discovery and sync.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(!self.disabled)
    }

    /// Resolve the transport kind.
    ///
    /// Precedence: explicit `transport` hint, then legacy `type` hint, then
    /// presence of `command` (stdio), then a url containing "sse" (sse), then
    /// any url (http). Historical configs carry any mix of these fields, so
    /// ambiguity resolves by precedence rather than rejection.
    pub fn transport_kind(&self) -> Result<TransportKind, McpError> {
        if let Some(hint) = self.transport.as_deref().or(self.type_hint.as_deref()) {
            return parse_transport_hint(&self.id, hint);
        }
        if self.command.is_some() {
            return Ok(TransportKind::Stdio);
        }
        if let Some(url) = &self.url {
            if url.to_lowercase().contains("sse") {
                return Ok(TransportKind::Sse);
            }
            return Ok(TransportKind::Http);
        }
        Err(McpError::Configuration(format!(
            "Backend {} missing transport information",
            self.id
        )))
    }
}

fn parse_transport_hint(id: &str, hint: &str) -> Result<TransportKind, McpError> {
    match hint.to_lowercase().replace('_', "-").as_str() {
        "stdio" => Ok(TransportKind::Stdio),
        "http" | "streamable-http" => Ok(TransportKind::Http),
        "sse" => Ok(TransportKind::Sse),
        other => Err(McpError::Configuration(format!(
            "Unsupported transport {other:?} for backend {id}"
        ))),
    }
}

/// `command` appears as either a string or an array in historical settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CommandField {
    Single(String),
    Argv(Vec<String>),
}

/// Raw serde shape of one `mcpServers` entry.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawBackend {
    #[serde(default)]
    command: Option<CommandField>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    transport: Option<String>,
    #[serde(default, rename = "type")]
    type_hint: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    disabled: bool,
}

impl RawBackend {
    /// Normalize into a [`BackendConfig`], splitting array commands into
    /// executable + prepended args.
    fn into_config(self, id: String) -> BackendConfig {
        let (command, mut args) = match self.command {
            Some(CommandField::Single(cmd)) => (Some(cmd), Vec::new()),
            Some(CommandField::Argv(argv)) => {
                let mut iter = argv.into_iter();
                (iter.next(), iter.collect())
            }
            None => (None, Vec::new()),
        };
        args.extend(self.args);
        BackendConfig {
            id,
            command,
            args,
            env: self.env,
            url: self.url,
            transport: self.transport,
            type_hint: self.type_hint,
            headers: self.headers,
            enabled: self.enabled,
            disabled: self.disabled,
        }
    }
}

/// Expand `${NAME}` placeholders against the supplied environment map.
///
/// Every referenced name missing from the map is collected; any miss fails
/// the whole expansion, listing all of them.
pub fn expand_placeholders(
    text: &str,
    env: &HashMap<String, String>,
) -> Result<String, McpError> {
    let mut missing: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = &caps[1];
        if !env.contains_key(name) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(McpError::Configuration(format!(
            "missing environment variables: {}",
            missing.join(", ")
        )));
    }
    Ok(PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| env[&caps[1]].clone())
        .into_owned())
}

/// Parse a settings document against the supplied environment map.
///
/// The document is JSON with an `mcpServers` map keyed by backend id.
/// Placeholders are expanded on the raw text before parsing; a missing or
/// non-object `mcpServers` member fails the load, while non-object entries
/// inside it are skipped.
pub fn load_settings(
    text: &str,
    env: &HashMap<String, String>,
) -> Result<Vec<BackendConfig>, McpError> {
    let expanded = expand_placeholders(text, env)?;
    let raw: serde_json::Value = serde_json::from_str(&expanded)
        .map_err(|e| McpError::Configuration(format!("invalid settings JSON: {e}")))?;
    let servers = raw
        .get("mcpServers")
        .and_then(|v| v.as_object())
        .ok_or_else(|| {
            McpError::Configuration("mcpServers missing or invalid in settings".into())
        })?;

    let mut configs = Vec::with_capacity(servers.len());
    for (id, entry) in servers {
        if !entry.is_object() {
            debug!(backend_id = %id, "Skipping non-object backend entry");
            continue;
        }
        let raw: RawBackend = serde_json::from_value(entry.clone()).map_err(|e| {
            McpError::Configuration(format!("invalid settings for backend {id}: {e}"))
        })?;
        configs.push(raw.into_config(id.clone()));
    }
    Ok(configs)
}

/// Load a settings file, expanding placeholders from the process environment.
pub fn load_settings_file(path: &Path) -> Result<Vec<BackendConfig>, McpError> {
    if !path.exists() {
        return Err(McpError::Configuration(format!(
            "MCP settings file not found: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let env: HashMap<String, String> = std::env::vars().collect();
    load_settings(&text, &env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholder_expansion() {
        let out = expand_placeholders("token=${API_KEY}", &env(&[("API_KEY", "abc")])).unwrap();
        assert_eq!(out, "token=abc");
    }

    #[test]
    fn test_placeholder_missing_lists_every_name() {
        let err = expand_placeholders("${API_KEY} ${OTHER} ${API_KEY}", &env(&[])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("API_KEY"), "{msg}");
        assert!(msg.contains("OTHER"), "{msg}");
        // deduplicated
        assert_eq!(msg.matches("API_KEY").count(), 1, "{msg}");
    }

    #[test]
    fn test_load_settings_stdio() {
        let text = r#"{
            "mcpServers": {
                "files": {
                    "command": "npx",
                    "args": ["-y", "@modelcontextprotocol/server-filesystem"],
                    "env": {"TOKEN": "${API_KEY}"}
                }
            }
        }"#;
        let configs = load_settings(text, &env(&[("API_KEY", "abc")])).unwrap();
        assert_eq!(configs.len(), 1);
        let c = &configs[0];
        assert_eq!(c.id, "files");
        assert_eq!(c.command.as_deref(), Some("npx"));
        assert_eq!(c.env["TOKEN"], "abc");
        assert_eq!(c.transport_kind().unwrap(), TransportKind::Stdio);
        assert!(c.is_enabled());
    }

    #[test]
    fn test_command_array_prepends_args() {
        let text = r#"{
            "mcpServers": {
                "runner": {
                    "command": ["uv", "run", "server.py"],
                    "args": ["--fast"]
                }
            }
        }"#;
        let configs = load_settings(text, &env(&[])).unwrap();
        let c = &configs[0];
        assert_eq!(c.command.as_deref(), Some("uv"));
        assert_eq!(c.args, vec!["run", "server.py", "--fast"]);
    }

    #[test]
    fn test_empty_command_array_means_no_command() {
        let text = r#"{"mcpServers": {"x": {"command": []}}}"#;
        let configs = load_settings(text, &env(&[])).unwrap();
        assert!(configs[0].command.is_none());
        assert!(configs[0].transport_kind().is_err());
    }

    #[test]
    fn test_missing_mcp_servers_fails() {
        assert!(load_settings(r#"{"servers": {}}"#, &env(&[])).is_err());
    }

    #[test]
    fn test_non_object_entries_skipped() {
        let text = r#"{"mcpServers": {"good": {"url": "http://x"}, "bad": 7}}"#;
        let configs = load_settings(text, &env(&[])).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].id, "good");
    }

    #[test]
    fn test_transport_precedence() {
        // explicit hint beats populated command
        let c = BackendConfig {
            id: "a".into(),
            command: Some("srv".into()),
            transport: Some("sse".into()),
            url: Some("http://x".into()),
            ..Default::default()
        };
        assert_eq!(c.transport_kind().unwrap(), TransportKind::Sse);

        // transport hint beats type hint
        let c = BackendConfig {
            id: "b".into(),
            transport: Some("http".into()),
            type_hint: Some("sse".into()),
            ..Default::default()
        };
        assert_eq!(c.transport_kind().unwrap(), TransportKind::Http);

        // command beats url
        let c = BackendConfig {
            id: "c".into(),
            command: Some("srv".into()),
            url: Some("http://x/sse".into()),
            ..Default::default()
        };
        assert_eq!(c.transport_kind().unwrap(), TransportKind::Stdio);

        // "sse" substring in the url
        let c = BackendConfig {
            id: "d".into(),
            url: Some("http://host/SSE/feed".into()),
            ..Default::default()
        };
        assert_eq!(c.transport_kind().unwrap(), TransportKind::Sse);

        // plain url
        let c = BackendConfig {
            id: "e".into(),
            url: Some("http://host/mcp".into()),
            ..Default::default()
        };
        assert_eq!(c.transport_kind().unwrap(), TransportKind::Http);
    }

    #[test]
    fn test_transport_hint_normalization() {
        let c = BackendConfig {
            id: "a".into(),
            transport: Some("Streamable_HTTP".into()),
            url: Some("http://x".into()),
            ..Default::default()
        };
        assert_eq!(c.transport_kind().unwrap(), TransportKind::Http);

        let c = BackendConfig {
            id: "a".into(),
            transport: Some("websocket".into()),
            ..Default::default()
        };
        assert!(matches!(
            c.transport_kind(),
            Err(McpError::Configuration(_))
        ));
    }

    #[test]
    fn test_enable_precedence() {
        let text = r#"{
            "mcpServers": {
                "a": {"url": "http://x", "disabled": true},
                "b": {"url": "http://x", "disabled": true, "enabled": true},
                "c": {"url": "http://x", "enabled": false},
                "d": {"url": "http://x"}
            }
        }"#;
        let configs = load_settings(text, &env(&[])).unwrap();
        let by_id: HashMap<_, _> = configs.iter().map(|c| (c.id.clone(), c)).collect();
        assert!(!by_id["a"].is_enabled());
        assert!(by_id["b"].is_enabled());
        assert!(!by_id["c"].is_enabled());
        assert!(by_id["d"].is_enabled());
    }
}
