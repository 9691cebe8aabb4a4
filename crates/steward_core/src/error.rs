//! Error types for the controller lifecycle.

use crate::session::InvalidTransition;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// A fatal handshake failure. Each variant names the step that failed.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid server configuration ({0})")]
    InvalidEndpoint(&'static str),

    #[error("Couldn't connect to server! {0}")]
    Connect(#[source] TransportError),

    #[error("Couldn't authenticate on server with user '{login}'! {source}")]
    Authenticate {
        login: String,
        #[source]
        source: TransportError,
    },

    #[error("Couldn't enable callbacks! {0}")]
    EnableCallbacks(#[source] TransportError),

    #[error("Server couldn't get ready within {0:?}!")]
    ServerNotReady(Duration),

    #[error("Couldn't query server status! {0}")]
    StatusQuery(#[source] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] InvalidTransition),
}

impl BootstrapError {
    /// Remote error code carried by the underlying transport failure.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            BootstrapError::Connect(source)
            | BootstrapError::Authenticate { source, .. }
            | BootstrapError::EnableCallbacks(source)
            | BootstrapError::StatusQuery(source) => source.code(),
            _ => None,
        }
    }
}
