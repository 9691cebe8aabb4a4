//! Remote procedure transport.
//!
//! The controller never speaks the wire protocol directly. It holds a
//! [`Transport`] obtained from a [`Connector`] and issues named calls
//! through it. Whatever the remote side pushes on its own (callbacks) is
//! buffered by the transport until the dispatch subsystem drains it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

mod json_line;

pub use json_line::{JsonLineConnector, JsonLineTransport};

/// A callback pushed by the remote server outside of any request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCallback {
    /// Callback name, e.g. `ManiaPlanet.PlayerConnect`
    pub method: String,
    /// Positional callback arguments
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RemoteCallback {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Errors surfaced by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Couldn't connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// The remote side rejected the call. Rendered as `message (code)`.
    #[error("{message} ({code})")]
    Remote { code: String, message: String },

    #[error("Call to {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Malformed message from server: {0}")]
    Protocol(String),

    #[error("Connection closed by server")]
    Closed,

    #[error("Not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Remote error code, if the server returned one.
    pub fn code(&self) -> Option<&str> {
        match self {
            TransportError::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the error leaves the underlying connection unusable.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::Closed | TransportError::NotConnected | TransportError::Io(_)
        )
    }
}

/// An initialized connection to the remote server.
///
/// Calls are strictly sequential: the controller awaits each call before
/// issuing the next one.
#[async_trait]
pub trait Transport: Send {
    /// Issues a named remote call and waits for its result.
    async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;

    /// Returns every callback received since the last drain, oldest first.
    async fn drain_callbacks(&mut self) -> Result<Vec<RemoteCallback>, TransportError>;

    fn is_connected(&self) -> bool;

    /// Releases the underlying network resources. Further calls fail with
    /// [`TransportError::NotConnected`].
    async fn terminate(&mut self);
}

/// Produces initialized transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
