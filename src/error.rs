//! Error taxonomy for the sync loop.
//!
//! Every variant except `Config` is recovered inside the loop and turned into a
//! connection status plus a console line. Nothing here is allowed to stop polling.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The request never produced a response (refused, reset, timed out).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a non-success status code.
    #[error("server answered HTTP {status}")]
    HttpStatus { status: u16 },

    /// The body was not a decodable state snapshot.
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The body decoded but carries values no training run can produce.
    #[error("schema violation in `{field}`: {reason}")]
    Schema { field: &'static str, reason: String },

    #[error("no successful update for {}s", .since.as_secs())]
    Stale { since: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Errors that mean "the remote side is unreachable or talking nonsense".
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::HttpStatus { .. } | SyncError::Malformed(_)
        )
    }

    /// Console line shown to the user for a failed poll.
    pub fn console_line(&self) -> String {
        match self {
            SyncError::Schema { .. } => format!("Rejected state snapshot: {self}"),
            _ => format!("Connection error: {self}"),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => SyncError::HttpStatus {
                status: status.as_u16(),
            },
            None => SyncError::Transport(e.to_string()),
        }
    }
}
