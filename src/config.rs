//! Sync configuration, persisted as JSON under the OS config directory.
//!
//! Locations:
//! - Linux: ~/.config/trainwatch/config.json
//! - Windows: %APPDATA%\trainwatch\config.json
//! - MacOS: ~/Library/Application Support/trainwatch/config.json

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SyncError;
use crate::reconcile::Thresholds;
use crate::view::ConsoleBuffer;

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_watchdog_period_ms() -> u64 {
    5_000
}

fn default_stale_after_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_ack_grace_ms() -> u64 {
    800
}

fn default_console_line_height() -> u32 {
    18
}

fn default_console_viewport_height() -> u32 {
    360
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Delay between a fetch settling and the next one starting.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_watchdog_period_ms")]
    pub watchdog_period_ms: u64,
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    /// Upper bound on one hung request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long an optimistic control change survives a contradicting snapshot.
    #[serde(default = "default_ack_grace_ms")]
    pub ack_grace_ms: u64,
    #[serde(default = "default_console_line_height")]
    pub console_line_height: u32,
    #[serde(default = "default_console_viewport_height")]
    pub console_viewport_height: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_ms: default_poll_interval_ms(),
            watchdog_period_ms: default_watchdog_period_ms(),
            stale_after_ms: default_stale_after_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            ack_grace_ms: default_ack_grace_ms(),
            console_line_height: default_console_line_height(),
            console_viewport_height: default_console_viewport_height(),
        }
    }
}

impl SyncConfig {
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("trainwatch").join("config.json"))
    }

    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            info!("No config at {:?}; using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("Failed to read {:?}: {e}", path)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        let cfg: SyncConfig = serde_json::from_str(raw)
            .map_err(|e| SyncError::Config(format!("Failed to parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Failed to create directory {:?}: {e}", parent))
            })?;
        }
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| SyncError::Config(format!("Failed to encode config: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| SyncError::Config(format!("Failed to write {:?}: {e}", path)))
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "server_url must be an http(s) URL, got {:?}",
                self.server_url
            )));
        }
        for (name, v) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("watchdog_period_ms", self.watchdog_period_ms),
            ("stale_after_ms", self.stale_after_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ] {
            if v == 0 {
                return Err(SyncError::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            stale_after: Duration::from_millis(self.stale_after_ms),
            ack_grace: Duration::from_millis(self.ack_grace_ms),
        }
    }

    pub fn console(&self) -> ConsoleBuffer {
        ConsoleBuffer::new(self.console_line_height, self.console_viewport_height)
    }
}
