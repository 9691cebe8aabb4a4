//! Remote server status probing.

use crate::session::ConnectionSession;
use crate::transport::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Status code of a server that is running and playable.
pub const STATUS_RUNNING_PLAY: i64 = 4;

/// Game mode value for script-driven modes.
pub const GAME_MODE_SCRIPT: i64 = 0;

/// Reads the remote server's status and game mode.
#[async_trait]
pub trait StatusProbe: Send {
    /// Polls until the server reports `code`, or `budget` runs out.
    /// Returns `Ok(false)` on timeout.
    async fn wait_for_status(
        &mut self,
        session: &mut ConnectionSession,
        code: i64,
        budget: Duration,
    ) -> Result<bool, TransportError>;

    async fn game_mode(&mut self, session: &mut ConnectionSession) -> Result<i64, TransportError>;
}

/// [`StatusProbe`] backed by `GetStatus` / `GetGameMode` calls.
#[derive(Debug, Clone)]
pub struct RemoteStatusProbe {
    poll_interval: Duration,
}

impl RemoteStatusProbe {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    async fn status_code(session: &mut ConnectionSession) -> Result<i64, TransportError> {
        let status = session.call("GetStatus", Vec::new()).await?;
        status
            .get("Code")
            .and_then(Value::as_i64)
            .ok_or_else(|| TransportError::Protocol(format!("unexpected status: {status}")))
    }
}

impl Default for RemoteStatusProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl StatusProbe for RemoteStatusProbe {
    async fn wait_for_status(
        &mut self,
        session: &mut ConnectionSession,
        code: i64,
        budget: Duration,
    ) -> Result<bool, TransportError> {
        let deadline = Instant::now() + budget;
        let mut announced = false;

        loop {
            let current = Self::status_code(session).await?;
            if current == code {
                return Ok(true);
            }
            if Instant::now() + self.poll_interval > deadline {
                return Ok(false);
            }
            if !announced {
                info!("Waiting for server to reach status {}...", code);
                announced = true;
            }
            debug!("Server status is {}, polling again", current);
            sleep(self.poll_interval).await;
        }
    }

    async fn game_mode(&mut self, session: &mut ConnectionSession) -> Result<i64, TransportError> {
        let mode = session.call("GetGameMode", Vec::new()).await?;
        mode.as_i64()
            .ok_or_else(|| TransportError::Protocol(format!("unexpected game mode: {mode}")))
    }
}
