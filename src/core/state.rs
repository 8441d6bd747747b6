//! Wire model for `GET /api/state`.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// One console line produced by the training process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            message: message.into(),
        }
    }
}

/// An immutable snapshot of the remote training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    pub episode: u32,
    pub total_episodes: u32,
    pub score: f64,
    pub avg_score: f64,
    pub epsilon: f64,
    pub timeouts: u32,
    pub step: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_base64: Option<String>,
    /// Full console history. Absent on servers that have nothing to report yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_messages: Option<Vec<LogEntry>>,

    // Effective control state, only present on servers that report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

impl RemoteState {
    /// Decode and validate a response body.
    pub fn from_json(body: &[u8]) -> Result<Self, SyncError> {
        let state: RemoteState = serde_json::from_slice(body)?;
        state.validate()?;
        Ok(state)
    }

    /// Reject snapshots that decode fine but cannot describe a real run.
    pub fn validate(&self) -> Result<(), SyncError> {
        for (field, v) in [
            ("score", self.score),
            ("avg_score", self.avg_score),
            ("epsilon", self.epsilon),
        ] {
            if !v.is_finite() {
                return Err(SyncError::Schema {
                    field,
                    reason: format!("{v} is not a finite number"),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(SyncError::Schema {
                field: "epsilon",
                reason: format!("{} is outside [0, 1]", self.epsilon),
            });
        }
        if self.total_episodes > 0 && self.episode > self.total_episodes {
            return Err(SyncError::Schema {
                field: "episode",
                reason: format!(
                    "episode {} exceeds total {}",
                    self.episode, self.total_episodes
                ),
            });
        }
        if let Some(speed) = self.speed {
            if !speed.is_finite() || speed <= 0.0 {
                return Err(SyncError::Schema {
                    field: "speed",
                    reason: format!("{speed} is not a positive multiplier"),
                });
            }
        }
        Ok(())
    }

    /// Raw image bytes of the frame, if one was sent.
    ///
    /// Frames are best-effort: callers skip the frame on error and keep the
    /// rest of the snapshot.
    pub fn decode_frame(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.frame_base64
            .as_deref()
            .map(|b64| base64::engine::general_purpose::STANDARD.decode(b64.trim()))
    }

    /// The reported log, or `None` when the snapshot carries no log entries.
    ///
    /// An absent or empty list says nothing about what was already rendered.
    pub fn reported_log(&self) -> Option<&[LogEntry]> {
        self.log_messages.as_deref().filter(|l| !l.is_empty())
    }

    /// Training progress in percent. Zero when the total is unknown.
    pub fn progress_percent(&self) -> f64 {
        if self.total_episodes == 0 {
            return 0.0;
        }
        self.episode as f64 / self.total_episodes as f64 * 100.0
    }
}

#[cfg(test)]
pub(crate) fn sample_state(episode: u32, logs: &[&str]) -> RemoteState {
    RemoteState {
        episode,
        total_episodes: 100,
        score: episode as f64,
        avg_score: episode as f64 / 2.0,
        epsilon: 0.5,
        timeouts: 0,
        step: episode as u64 * 10,
        frame_base64: None,
        log_messages: Some(
            logs.iter()
                .enumerate()
                .map(|(i, m)| LogEntry::new(format!("00:00:{i:02}"), *m))
                .collect(),
        ),
        speed: None,
        paused: None,
    }
}
