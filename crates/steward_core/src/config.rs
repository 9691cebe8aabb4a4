//! Controller configuration types and defaults.
//!
//! These are the runtime values the lifecycle needs. Loading them from a
//! file is the binary's job; see the `steward` crate.

use crate::chat::ChatSettings;
use crate::error::BootstrapError;
use std::fmt;
use std::time::Duration;

/// Where the dedicated server listens and how to log in.
///
/// Immutable once read. All four fields must be present before the
/// handshake begins; a missing one is a configuration error and is never
/// retried.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

impl ServerEndpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            login: login.into(),
            password: password.into(),
        }
    }

    /// Checks that every field is set.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.host.trim().is_empty() {
            return Err(BootstrapError::InvalidEndpoint("host"));
        }
        if self.port == 0 {
            return Err(BootstrapError::InvalidEndpoint("port"));
        }
        if self.login.is_empty() {
            return Err(BootstrapError::InvalidEndpoint("login"));
        }
        if self.password.is_empty() {
            return Err(BootstrapError::InvalidEndpoint("password"));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keep the password out of logs.
impl fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration structure for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// The dedicated server to attach to
    pub endpoint: ServerEndpoint,

    /// Budget for establishing the transport connection
    pub connect_timeout: Duration,

    /// Budget for the server to reach the ready status
    pub ready_timeout: Duration,

    /// Pause between two status polls while waiting for the server
    pub status_poll_interval: Duration,

    /// Chat prefix and colour formats
    pub chat: ChatSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoint: ServerEndpoint::new("127.0.0.1", 5000, "SuperAdmin", "SuperAdmin"),
            connect_timeout: Duration::from_secs(20),
            ready_timeout: Duration::from_secs(30),
            status_poll_interval: Duration::from_secs(1),
            chat: ChatSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.endpoint.validate().is_ok());
        assert_eq!(config.endpoint.address(), "127.0.0.1:5000");
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_missing_fields_are_named() {
        let valid = ServerEndpoint::new("localhost", 5000, "SuperAdmin", "secret");

        let mut endpoint = valid.clone();
        endpoint.host = "  ".to_string();
        assert!(matches!(
            endpoint.validate(),
            Err(BootstrapError::InvalidEndpoint("host"))
        ));

        let mut endpoint = valid.clone();
        endpoint.port = 0;
        assert!(matches!(
            endpoint.validate(),
            Err(BootstrapError::InvalidEndpoint("port"))
        ));

        let mut endpoint = valid.clone();
        endpoint.login.clear();
        assert!(matches!(
            endpoint.validate(),
            Err(BootstrapError::InvalidEndpoint("login"))
        ));

        let mut endpoint = valid;
        endpoint.password.clear();
        let err = endpoint.validate().unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let endpoint = ServerEndpoint::new("localhost", 5000, "SuperAdmin", "hunter2");
        let debug_str = format!("{:?}", endpoint);
        assert!(debug_str.contains("SuperAdmin"));
        assert!(!debug_str.contains("hunter2"));
    }
}
