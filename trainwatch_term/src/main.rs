//! trainwatch - terminal dashboard for a remote training process
//!
//! Polls `GET /api/state`, prints connection changes, new episodes and log
//! lines, and forwards key commands to `POST /api/control`.
//!
//! Config locations:
//! - Linux: ~/.config/trainwatch/config.json
//! - Windows: %APPDATA%\trainwatch\config.json
//! - MacOS: ~/Library/Application Support/trainwatch/config.json

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use trainwatch::transport::HttpRemote;
use trainwatch::view::DashboardModel;
use trainwatch::{CancellationToken, StatusSync, SyncConfig, SyncError};

mod input;
mod render;

use render::TerminalView;

// ═══════════════════════════════════════════════════════════════════════════
// Command line
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Parser)]
#[command(name = "trainwatch", version, about = "Watch and steer a remote training run")]
struct Args {
    /// Base URL of the training server
    #[arg(long)]
    server: Option<String>,

    /// Delay between polls in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Config file (defaults to the OS config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write every new frame image to this file
    #[arg(long)]
    frame_out: Option<PathBuf>,

    /// Persist the effective configuration and continue
    #[arg(long)]
    save_config: bool,
}

fn resolve_config(
    args: &Args,
) -> Result<(SyncConfig, Option<PathBuf>), Box<dyn std::error::Error>> {
    let path = args.config.clone().or_else(SyncConfig::default_path);
    let mut cfg = match path.as_deref() {
        Some(p) => SyncConfig::load(p)?,
        None => {
            warn!("Could not determine config directory; using defaults");
            SyncConfig::default()
        }
    };
    if let Some(server) = &args.server {
        cfg.server_url = server.clone();
    }
    if let Some(ms) = args.poll_ms {
        cfg.poll_interval_ms = ms;
    }
    cfg.validate()?;
    Ok((cfg, path))
}

/// Returns whether a file was written.
fn save_config(config: &SyncConfig, path: Option<&Path>) -> Result<bool, SyncError> {
    match path {
        Some(path) => {
            config.save(path)?;
            info!("Config saved to {:?}", path);
            Ok(true)
        }
        None => {
            warn!("--save-config ignored: no config directory, pass --config <file>");
            Ok(false)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they do not interleave with the dashboard on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (config, config_path) = resolve_config(&args)?;

    if args.save_config {
        save_config(&config, config_path.as_deref())?;
    }

    info!("Training server: {}", config.server_url);
    let remote = Arc::new(HttpRemote::new(&config.server_url, config.request_timeout())?);
    let view = TerminalView::new(
        std::io::stdout(),
        DashboardModel::new(config.console()),
        args.frame_out.clone(),
    );

    let shutdown = CancellationToken::new();
    let (sync, handle) = StatusSync::new(remote, view, &config, shutdown.child_token());

    // Ctrl-C stops the loop cleanly.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C: stopping");
                shutdown.cancel();
            }
        });
    }

    eprintln!("{}", input::HELP);
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = input::forward_stdin(handle).await {
                error!("stdin reader failed: {}", e);
            }
        });
    }

    let outcome = sync.run().await;
    info!(
        "Stopped: status {}, {} log entries, last episode {}, {} frames written",
        outcome.session.status().label(),
        outcome.session.processed_logs(),
        outcome.session.last_episode(),
        outcome.view.frames_written()
    );

    // The blocking stdin read cannot be cancelled and would hold runtime shutdown.
    std::process::exit(0);
}
