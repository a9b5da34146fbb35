//! Skill artifact rendering

use std::sync::LazyLock;

use regex::Regex;

use crate::error::McpError;
use crate::types::ToolSchema;

/// Fixed artifact filename inside each skill directory.
pub const SKILL_FILENAME: &str = "SKILL.md";

static LOWER_TO_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("casing regex is valid"));
static UPPER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("casing regex is valid"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex is valid"));

/// Convert camelCase or PascalCase to kebab-case.
///
/// A hyphen goes between a lowercase letter or digit and a following
/// uppercase letter, and between an uppercase run and a following
/// capitalized word (`HTTPServer` → `http-server`).
pub fn camel_to_kebab(value: &str) -> String {
    let value = LOWER_TO_UPPER.replace_all(value, "$1-$2");
    let value = UPPER_RUN.replace_all(&value, "$1-$2");
    value.to_lowercase()
}

/// Lowercase, collapse non-alphanumeric runs into single hyphens, trim.
pub fn slugify(value: &str) -> Result<String, McpError> {
    let value = value.to_lowercase();
    let value = NON_ALNUM.replace_all(&value, "-");
    let value = value.trim_matches('-');
    if value.is_empty() {
        return Err(McpError::Validation(
            "skill name resolved to empty string".into(),
        ));
    }
    Ok(value.to_string())
}

/// Slug prefix shared by every artifact of one backend.
pub fn backend_slug(backend_id: &str) -> Result<String, McpError> {
    slugify(&camel_to_kebab(backend_id))
}

/// Artifact directory name for one (backend, tool) pair.
pub fn skill_slug(backend_id: &str, tool_name: &str) -> Result<String, McpError> {
    slugify(&format!(
        "{}-{}",
        camel_to_kebab(backend_id),
        camel_to_kebab(tool_name)
    ))
}

/// Render one skill descriptor.
///
/// Pure function of the tool schema, the backend id and an optional
/// description override. A missing description falls back to a synthesized
/// sentence naming the tool and backend. The note about polling task status
/// is a convention assumed of the backends, not verified against them.
pub fn render_skill(
    tool: &ToolSchema,
    backend_id: &str,
    description_override: Option<&str>,
) -> Result<String, McpError> {
    let description = description_override
        .map(str::to_string)
        .or_else(|| {
            if tool.description.is_empty() {
                None
            } else {
                Some(tool.description.clone())
            }
        })
        .unwrap_or_else(|| {
            format!("Invoke MCP tool {} on backend {}.", tool.name, backend_id)
        });
    let description = description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "\\\"");

    let input_schema = if tool.input_schema.is_null() {
        serde_json::json!({})
    } else {
        tool.input_schema.clone()
    };
    let input_schema = serde_json::to_string_pretty(&input_schema)
        .map_err(|e| McpError::Protocol(format!("unrenderable input schema: {e}")))?;

    let slug = skill_slug(backend_id, &tool.name)?;
    let tool_name = &tool.name;

    Ok(format!(
        r#"---
name: {slug}
description: "{description}"
---

# MCP Tool: {tool_name}
Backend: {backend_id}

## Usage
Send the payload below through the bridge request tool as a JSON string:

```json
{{"backend_id":"{backend_id}","tool_name":"{tool_name}","arguments":{{}}}}
```

## Tool Description
{description}

## Arguments Schema
The schema below describes the `arguments` object in the request payload.
```json
{input_schema}
```

## Background Tasks
If the tool returns a task id, poll the task status via the raw request method:

```json
{{"backend_id":"{backend_id}","method":"tasks/status","params":{{"task_id":"<task_id>"}}}}
```
"#
    ))
}
