//! # Skillbridge
//!
//! MCP skill bridge - advertising backend tools as agent skills.
//!
//! This crate connects to MCP backends over stdio, HTTP or SSE, generates
//! one skill descriptor per backend tool, and proxies live tool invocations
//! back to the owning backend.
//!
//! ## Features
//!
//! - Connect to MCP backends via stdio subprocess, HTTP, or SSE
//! - Automatic tool discovery with per-backend failure isolation
//! - Deterministic skill generation with hash-based change detection
//! - Presentation symlinks toggled by backend enable state
//! - JSON request bridge and optional HTTP server deployment
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skillbridge::{load_settings_file, McpManager, SyncOptions};
//!
//! let configs = load_settings_file("mcp_settings.json".as_ref())?;
//! let enabled: Vec<_> = configs.iter().filter(|c| c.is_enabled()).cloned().collect();
//! let manager = Arc::new(McpManager::new(enabled));
//!
//! let opts = SyncOptions::new(
//!     "mcp-skills".into(),
//!     "skills".into(),
//!     "mcp_settings.lock".into(),
//! );
//! let outcome = skillbridge::sync(&manager, &configs, &opts).await?;
//! if outcome.lock_changed {
//!     println!("skills changed; reload the agent");
//! }
//! ```

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod server;
pub mod skill;
pub mod sync;
pub mod transport;
pub mod types;

pub use bridge::Bridge;
pub use config::{load_settings, load_settings_file, BackendConfig, TransportKind};
pub use connection::McpConnection;
pub use error::McpError;
pub use manager::McpManager;
pub use sync::{sync, SyncOptions, SyncOutcome};
pub use transport::McpTransport;
pub use types::*;
