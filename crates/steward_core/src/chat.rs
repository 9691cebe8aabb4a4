//! Chat utility for status lines shown to players.
//!
//! Messages are wrapped in the server's formatting codes: `$<` / `$>`
//! scope the styling, `$z` resets it and `$ff0` colours the prefix.

use crate::session::ConnectionSession;
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Prefix and colour formats used when composing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Put in front of every prefixed message
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Colour code for neutral information
    #[serde(default = "default_information_format")]
    pub information_format: String,
    /// Colour code for confirmations
    #[serde(default = "default_success_format")]
    pub success_format: String,
    /// Colour code for failures
    #[serde(default = "default_error_format")]
    pub error_format: String,
    /// Colour code for command usage hints
    #[serde(default = "default_usage_format")]
    pub usage_format: String,
}

fn default_prefix() -> String {
    "» ".to_string()
}

fn default_information_format() -> String {
    "$fff".to_string()
}

fn default_success_format() -> String {
    "$0f0".to_string()
}

fn default_error_format() -> String {
    "$f30".to_string()
}

fn default_usage_format() -> String {
    "$f80".to_string()
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            information_format: default_information_format(),
            success_format: default_success_format(),
            error_format: default_error_format(),
            usage_format: default_usage_format(),
        }
    }
}

/// Which prefix to put in front of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix<'a> {
    /// The configured prefix, doubled for private messages.
    Default,
    /// Used as-is, also for private messages.
    Custom(&'a str),
    None,
}

/// Sends formatted chat lines through a [`ConnectionSession`].
///
/// Chat is best-effort: without a live transport every send fails with
/// [`TransportError::NotConnected`] and callers usually just log it.
#[derive(Debug, Clone, Default)]
pub struct Chat {
    settings: ChatSettings,
}

impl Chat {
    /// Creates a chat utility using `settings` for prefix and colours.
    pub fn new(settings: ChatSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    fn build_prefix(&self, prefix: Prefix<'_>, private: bool) -> String {
        match prefix {
            Prefix::Custom(custom) => custom.to_string(),
            Prefix::None => String::new(),
            Prefix::Default if private => self.settings.prefix.repeat(2),
            Prefix::Default => self.settings.prefix.clone(),
        }
    }

    /// Builds the exact text sent to the server.
    pub fn compose(&self, message: &str, login: Option<&str>, prefix: Prefix<'_>) -> String {
        let prefix = self.build_prefix(prefix, login.is_some());
        format!("$<$z$ff0{prefix}{message}$>")
    }

    /// Sends a chat line to everyone, or privately to `login`.
    ///
    /// # Arguments
    /// * `message` - text after the prefix, may carry its own format codes
    /// * `login` - recipient of a private message, `None` for everyone
    /// * `prefix` - which prefix to use
    ///
    /// # Returns
    /// * `Err(TransportError::NotConnected)` - no live transport
    /// * `Err(_)` - the server rejected the message
    pub async fn send_chat(
        &self,
        session: &mut ConnectionSession,
        message: &str,
        login: Option<&str>,
        prefix: Prefix<'_>,
    ) -> Result<(), TransportError> {
        if !session.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let text = self.compose(message, login, prefix);
        let result = match login {
            Some(login) => {
                session
                    .call("ChatSendServerMessageToLogin", vec![json!(text), json!(login)])
                    .await
            }
            None => session.call("ChatSendServerMessage", vec![json!(text)]).await,
        };

        if let Err(e) = &result {
            debug!("Chat message not delivered: {}", e);
        }
        result.map(|_| ())
    }

    /// Sends `message` in the information colour.
    pub async fn send_information(
        &self,
        session: &mut ConnectionSession,
        message: &str,
        login: Option<&str>,
    ) -> Result<(), TransportError> {
        let formatted = format!("{}{}", self.settings.information_format, message);
        self.send_chat(session, &formatted, login, Prefix::Default).await
    }

    /// Sends `message` in the success colour.
    pub async fn send_success(
        &self,
        session: &mut ConnectionSession,
        message: &str,
        login: Option<&str>,
    ) -> Result<(), TransportError> {
        let formatted = format!("{}{}", self.settings.success_format, message);
        self.send_chat(session, &formatted, login, Prefix::Default).await
    }

    /// Sends `message` in the error colour.
    pub async fn send_error(
        &self,
        session: &mut ConnectionSession,
        message: &str,
        login: Option<&str>,
    ) -> Result<(), TransportError> {
        let formatted = format!("{}{}", self.settings.error_format, message);
        self.send_chat(session, &formatted, login, Prefix::Default).await
    }

    /// Usage hints go out without a prefix.
    pub async fn send_usage_info(
        &self,
        session: &mut ConnectionSession,
        message: &str,
        login: Option<&str>,
    ) -> Result<(), TransportError> {
        let formatted = format!("{}{}", self.settings.usage_format, message);
        self.send_chat(session, &formatted, login, Prefix::None).await
    }

    /// Public information line for lifecycle announcements.
    pub async fn announce(
        &self,
        session: &mut ConnectionSession,
        text: &str,
    ) -> Result<(), TransportError> {
        self.send_information(session, text, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedServer;

    #[test]
    fn test_compose_public_and_private() {
        let chat = Chat::default();
        assert_eq!(
            chat.compose("Hello", None, Prefix::Default),
            "$<$z$ff0» Hello$>"
        );
        assert_eq!(
            chat.compose("Hello", Some("alice"), Prefix::Default),
            "$<$z$ff0» » Hello$>"
        );
        assert_eq!(
            chat.compose("Hello", Some("alice"), Prefix::Custom("[Admin] ")),
            "$<$z$ff0[Admin] Hello$>"
        );
        assert_eq!(chat.compose("Hello", None, Prefix::None), "$<$z$ff0Hello$>");
    }

    #[tokio::test]
    async fn test_send_information_to_everyone() {
        let server = ScriptedServer::new();
        let mut session = ConnectionSession::new();
        session.attach_transport(server.transport());

        Chat::default()
            .send_information(&mut session, "Server restarting", None)
            .await
            .unwrap();

        let calls = server.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "ChatSendServerMessage");
        assert_eq!(calls[0].params, vec![json!("$<$z$ff0» $fffServer restarting$>")]);
    }

    #[tokio::test]
    async fn test_private_usage_info_has_no_prefix() {
        let server = ScriptedServer::new();
        let mut session = ConnectionSession::new();
        session.attach_transport(server.transport());

        Chat::default()
            .send_usage_info(&mut session, "Usage: //skip", Some("alice"))
            .await
            .unwrap();

        let calls = server.calls();
        assert_eq!(calls[0].method, "ChatSendServerMessageToLogin");
        assert_eq!(
            calls[0].params,
            vec![json!("$<$z$ff0$f80Usage: //skip$>"), json!("alice")]
        );
    }

    #[tokio::test]
    async fn test_send_without_transport_fails() {
        let mut session = ConnectionSession::new();
        let err = Chat::default()
            .announce(&mut session, "nobody listens")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_remote_rejection_is_reported() {
        let server = ScriptedServer::new().fail(
            "ChatSendServerMessageToLogin",
            "-1000",
            "Login unknown.",
        );
        let mut session = ConnectionSession::new();
        session.attach_transport(server.transport());

        let err = Chat::default()
            .send_error(&mut session, "Nope", Some("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("-1000"));
    }
}
