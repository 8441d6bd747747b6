//! The two remote endpoints, behind a trait so the loop can be driven by
//! anything that produces snapshots.

use async_trait::async_trait;

use crate::commands::ControlCommand;
use crate::error::SyncError;
use crate::state::RemoteState;

pub const STATE_PATH: &str = "/api/state";
pub const CONTROL_PATH: &str = "/api/control";

#[async_trait]
pub trait RemoteSource: Send + Sync + 'static {
    /// `GET /api/state`, decoded and validated.
    async fn fetch_state(&self) -> Result<RemoteState, SyncError>;

    /// `POST /api/control`. Best-effort; callers do not wait on the outcome for correctness.
    async fn send_control(&self, command: &ControlCommand) -> Result<(), SyncError>;
}

#[cfg(feature = "http")]
pub use http::HttpRemote;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use tracing::debug;

    use super::{RemoteSource, CONTROL_PATH, STATE_PATH};
    use crate::commands::ControlCommand;
    use crate::error::SyncError;
    use crate::state::RemoteState;

    #[derive(Debug, Clone)]
    pub struct HttpRemote {
        client: Client,
        base_url: String,
    }

    impl HttpRemote {
        pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
            let client = Client::builder()
                .timeout(timeout)
                .user_agent(format!("trainwatch/{}", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {e}")))?;
            Ok(Self {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            })
        }

        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }
    }

    #[async_trait]
    impl RemoteSource for HttpRemote {
        async fn fetch_state(&self) -> Result<RemoteState, SyncError> {
            let response = self
                .client
                .get(self.url(STATE_PATH))
                .send()
                .await?
                .error_for_status()?;
            // Body first, decode second, so a bad body is Malformed rather than Transport.
            let body = response.bytes().await?;
            RemoteState::from_json(&body)
        }

        async fn send_control(&self, command: &ControlCommand) -> Result<(), SyncError> {
            debug!("POST {} {:?}", CONTROL_PATH, command);
            self.client
                .post(self.url(CONTROL_PATH))
                .json(command)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }
    }
}
