//! MCP type definitions

use serde::{Deserialize, Serialize};

/// Tool schema advertised by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: String,
    /// Input schema (JSON Schema)
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,
}

/// Server information returned on initialize
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Server name
    #[serde(default)]
    pub name: String,
    /// Server version
    #[serde(default)]
    pub version: String,
    /// Protocol version
    #[serde(default)]
    pub protocol_version: String,
}

/// Parse the `tools` array of a `tools/list` result.
///
/// Entries without a name are skipped; backends with malformed entries still
/// contribute the rest of their catalog.
pub fn parse_tools(result: &serde_json::Value) -> Vec<ToolSchema> {
    result["tools"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| serde_json::from_value::<ToolSchema>(v.clone()).ok())
                .filter(|t| !t.name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
