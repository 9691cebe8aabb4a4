//! The connection session owned by the controller.
//!
//! There is exactly one session per process. It holds the transport from
//! the moment it is created until termination, along with the outcome of
//! the optional feature negotiations.

use crate::transport::{Transport, TransportError};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Lifecycle state of the remote session. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticated,
    CallbacksEnabled,
    Ready,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticated => "authenticated",
            SessionState::CallbacksEnabled => "callbacks-enabled",
            SessionState::Ready => "ready",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move session from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Mutable state of the single remote session.
pub struct ConnectionSession {
    state: SessionState,
    transport: Option<Box<dyn Transport>>,
    api_version_accepted: bool,
    script_callbacks_enabled: bool,
    history: Vec<SessionState>,
}

impl ConnectionSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            transport: None,
            api_version_accepted: false,
            script_callbacks_enabled: false,
            history: vec![SessionState::Disconnected],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    /// Moves the session forward. Going back, or entering a state twice,
    /// is rejected.
    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if next <= self.state {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Session {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    pub fn attach_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// True when a transport exists and still reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|transport| transport.is_connected())
    }

    pub fn transport_mut(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        self.transport.as_deref_mut()
    }

    /// Issues a remote call through the session's transport.
    pub async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        match self.transport.as_deref_mut() {
            Some(transport) => transport.call(method, params).await,
            None => Err(TransportError::NotConnected),
        }
    }

    /// Terminates and releases the transport, then marks the session
    /// terminated. Returns whether a transport was actually terminated.
    pub async fn terminate(&mut self) -> bool {
        let terminated = match self.transport.take() {
            Some(mut transport) => {
                transport.terminate().await;
                true
            }
            None => false,
        };
        if self.state != SessionState::Terminated {
            self.state = SessionState::Terminated;
            self.history.push(SessionState::Terminated);
        }
        terminated
    }

    pub fn api_version_accepted(&self) -> bool {
        self.api_version_accepted
    }

    pub fn set_api_version_accepted(&mut self, accepted: bool) {
        self.api_version_accepted = accepted;
    }

    pub fn script_callbacks_enabled(&self) -> bool {
        self.script_callbacks_enabled
    }

    pub fn set_script_callbacks_enabled(&mut self, enabled: bool) {
        self.script_callbacks_enabled = enabled;
    }
}

impl Default for ConnectionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("state", &self.state)
            .field("connected", &self.is_connected())
            .field("api_version_accepted", &self.api_version_accepted)
            .field("script_callbacks_enabled", &self.script_callbacks_enabled)
            .finish()
    }
}
