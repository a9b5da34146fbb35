//! Tool catalog discovery across backends

use std::collections::BTreeMap;

use tracing::error;

use crate::manager::McpManager;
use crate::types::ToolSchema;

/// Discover the tool catalog of each backend.
///
/// A backend whose discovery fails is logged and omitted; the others still
/// contribute, so a partial catalog is a valid outcome. The map is keyed by
/// backend id and sorted, which keeps every downstream pass deterministic.
pub async fn gather_tools(
    manager: &McpManager,
    backend_ids: &[String],
) -> BTreeMap<String, Vec<ToolSchema>> {
    let mut tools_by_backend = BTreeMap::new();
    for backend_id in backend_ids {
        match manager.list_tools(backend_id).await {
            Ok(tools) => {
                tools_by_backend.insert(backend_id.clone(), tools);
            }
            Err(e) => {
                error!(backend_id = %backend_id, error = %e, "tools/list failed, omitting backend");
            }
        }
    }
    tools_by_backend
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    #[tokio::test]
    async fn test_one_bad_backend_does_not_abort_the_pass() {
        // Neither backend resolves to a reachable transport; the pass must
        // still complete with an empty catalog rather than an error.
        let configs = vec![
            BackendConfig {
                id: "broken".into(),
                ..Default::default()
            },
            BackendConfig {
                id: "also-broken".into(),
                transport: Some("carrier-pigeon".into()),
                ..Default::default()
            },
        ];
        let manager = McpManager::new(configs);
        let ids = manager.backend_ids();
        let catalog = gather_tools(&manager, &ids).await;
        assert!(catalog.is_empty());
    }
}
