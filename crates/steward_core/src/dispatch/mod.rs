//! Callback and event dispatch.
//!
//! The tick loop hands control to an [`EventDispatcher`] once per tick.
//! The dispatcher decides what is due: remote callbacks buffered by the
//! transport, timed listeners, and so on.

use crate::session::ConnectionSession;
use crate::transport::TransportError;
use async_trait::async_trait;
use std::fmt;

mod callbacks;

pub use callbacks::{CallbackManager, DispatchStats};

/// Controller-wide notifications broadcast to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerEvent {
    /// Bootstrap finished and the tick loop is about to start.
    Init,
    /// Teardown has begun; the transport is still attached.
    Shutdown,
}

impl ControllerEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            ControllerEvent::Init => "controller.init",
            ControllerEvent::Shutdown => "controller.shutdown",
        }
    }
}

impl fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Unrecoverable dispatch failure. Ends the tick loop.
///
/// Only a lost connection qualifies; unreadable messages and failing
/// listeners are logged by the dispatcher and the tick goes on.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Transport failure while draining callbacks: {0}")]
    Transport(#[from] TransportError),
}

/// Listener failure. Logged by the dispatcher, never escalated.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Malformed callback payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Listener execution error: {0}")]
    Execution(String),
}

/// The dispatch subsystem as seen by the controller.
#[async_trait]
pub trait EventDispatcher: Send {
    /// Runs everything that is due. Returns only after all due listeners
    /// have run.
    async fn process_due_events(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<(), DispatchError>;

    /// Fire-and-forget broadcast of a controller event.
    async fn notify(&mut self, event: ControllerEvent);
}
