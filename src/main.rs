//! MCP skill bridge entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skillbridge::config::load_settings_file;
use skillbridge::manager::McpManager;
use skillbridge::server::{self, AppState, SyncState};
use skillbridge::sync::{sync, SyncOptions, LOCK_FILENAME};

/// MCP Skill Bridge
#[derive(Parser, Debug)]
#[command(version, about = "MCP skill bridge - advertise backend tools as agent skills")]
struct Cli {
    /// Path to the MCP settings JSON
    #[arg(long = "mcp-settings")]
    mcp_settings: PathBuf,

    /// Canonical directory for generated skill artifacts
    #[arg(long, default_value = "mcp-skills")]
    output_dir: PathBuf,

    /// Visible skills directory holding the symlinks
    #[arg(long, default_value = "skills")]
    skills_dir: PathBuf,

    /// Lock file path (default: mcp_settings.lock beside the output dir)
    #[arg(long)]
    lock_file: Option<PathBuf>,

    /// Rewrite every artifact regardless of the lock
    #[arg(long)]
    force_refresh: bool,

    /// Port for the bridge server (0 = OS-assigned ephemeral)
    #[arg(long, default_value_t = 28080)]
    port: u16,

    /// Generate skills and exit without starting the HTTP server
    #[arg(long)]
    skills_only: bool,

    /// Log level filter
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Settings failures are fatal: no partial configuration is tolerated.
    let configs = load_settings_file(&cli.mcp_settings)?;
    let enabled: Vec<_> = configs.iter().filter(|c| c.is_enabled()).cloned().collect();
    info!(
        enabled = enabled.len(),
        configured = configs.len(),
        "Loaded MCP settings"
    );

    let manager = Arc::new(McpManager::new(enabled));

    let lock_path = cli.lock_file.clone().unwrap_or_else(|| {
        cli.output_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join(LOCK_FILENAME)
    });
    let mut opts = SyncOptions::new(cli.output_dir.clone(), cli.skills_dir.clone(), lock_path);
    opts.force_refresh = cli.force_refresh;

    if cli.skills_only {
        let outcome = sync(&manager, &configs, &opts).await?;
        if outcome.lock_changed {
            info!(hash = %outcome.hash, "Skills changed; agent reload required");
        } else {
            info!("Skills unchanged");
        }
        manager.shutdown().await;
        return Ok(());
    }

    let listener = TcpListener::bind(("127.0.0.1", cli.port)).await?;
    let port = listener.local_addr()?.port();
    opts.port = Some(port);

    // Discovery runs in the background; early callers wait on the channel.
    let (tx, rx) = watch::channel(SyncState::Pending);
    {
        let manager = manager.clone();
        let configs = configs.clone();
        tokio::spawn(async move {
            match sync(&manager, &configs, &opts).await {
                Ok(outcome) => {
                    if outcome.lock_changed {
                        info!(hash = %outcome.hash, "Skills changed; agent reload required");
                    }
                    let _ = tx.send(SyncState::Ready);
                }
                Err(e) => {
                    error!(error = %e, "Skill sync failed");
                    let _ = tx.send(SyncState::Failed(e.to_string()));
                }
            }
        });
    }

    let state = AppState::new(manager, rx);
    server::serve(listener, state).await?;
    Ok(())
}
