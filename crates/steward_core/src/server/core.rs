//! The controller itself.
//!
//! [`Controller`] wires the lifecycle together: it owns the session and
//! every collaborator, runs the handshake, drives the tick loop and always
//! finishes with the shutdown sequence. It never exits the process; the
//! caller maps the returned [`ShutdownReason`] to an exit code.

use super::bootstrap::Handshake;
use super::shutdown::{shutdown_sequence, ShutdownHandle, ShutdownReason};
use super::tick::TickScheduler;
use crate::chat::Chat;
use crate::config::ControllerConfig;
use crate::dispatch::{ControllerEvent, EventDispatcher};
use crate::session::ConnectionSession;
use crate::status::{RemoteStatusProbe, StatusProbe};
use crate::transport::Connector;
use crate::{CONTROLLER_NAME, VERSION};
use tracing::{info, warn};

/// The dedicated server controller.
///
/// Owns the [`ConnectionSession`] for its whole life. Collaborators are
/// boxed trait objects so tests can swap the connector, status probe and
/// dispatcher independently.
pub struct Controller {
    config: ControllerConfig,
    connector: Box<dyn Connector>,
    probe: Box<dyn StatusProbe>,
    dispatcher: Box<dyn EventDispatcher>,
    chat: Chat,
    session: ConnectionSession,
    shutdown: ShutdownHandle,
}

impl Controller {
    /// Creates a controller polling server status with a
    /// [`RemoteStatusProbe`].
    ///
    /// # Arguments
    /// * `config` - endpoint, timeouts and chat settings
    /// * `connector` - opens the transport during the handshake
    /// * `dispatcher` - receives every tick and controller event
    pub fn new(
        config: ControllerConfig,
        connector: impl Connector + 'static,
        dispatcher: impl EventDispatcher + 'static,
    ) -> Self {
        let probe = RemoteStatusProbe::new(config.status_poll_interval);
        let chat = Chat::new(config.chat.clone());

        Self {
            config,
            connector: Box::new(connector),
            probe: Box::new(probe),
            dispatcher: Box::new(dispatcher),
            chat,
            session: ConnectionSession::new(),
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Replaces the status probe used to wait for the server and read its
    /// game mode.
    pub fn with_status_probe(mut self, probe: impl StatusProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// A handle other tasks can use to stop the controller.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Records a shutdown request. The tick loop notices it at the next
    /// tick boundary.
    pub fn request_shutdown(&self, message: Option<String>) {
        self.shutdown.request_shutdown(message);
    }

    /// The controlled session, including its state history.
    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Configuration this controller was created with.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Bootstraps the session, runs the tick loop and shuts down.
    ///
    /// Returns once the shutdown sequence has completed. A failed
    /// handshake skips the tick loop but still shuts down.
    ///
    /// # Returns
    /// * `OperatorRequested` - a shutdown was requested through the handle
    /// * `BootstrapFailure` - a load-bearing handshake step failed
    /// * `FatalLoopError` - dispatching lost the connection
    pub async fn start(&mut self) -> ShutdownReason {
        info!("Starting {} v{}...", CONTROLLER_NAME, VERSION);

        let bootstrap = Handshake::new(&self.config, self.connector.as_ref(), self.probe.as_mut())
            .run(&mut self.session)
            .await;
        // The handshake has already logged the failing step.
        if let Err(e) = bootstrap {
            let message = e.to_string();
            return self
                .shutdown(ShutdownReason::BootstrapFailure, Some(&message))
                .await;
        }

        info!("Loading completed!");
        let started = format!("{} v{} successfully started!", CONTROLLER_NAME, VERSION);
        if let Err(e) = self.chat.announce(&mut self.session, &started).await {
            warn!("Couldn't announce startup: {}", e);
        }
        self.dispatcher.notify(ControllerEvent::Init).await;

        let mut scheduler = TickScheduler::new(self.shutdown.clone());
        let reason = scheduler
            .run(&mut self.session, self.dispatcher.as_mut())
            .await;

        let message = self.shutdown.message();
        self.shutdown(reason, message.as_deref()).await
    }

    /// Runs the shutdown sequence. Safe to call more than once; later
    /// calls only log.
    ///
    /// # Arguments
    /// * `reason` - returned unchanged
    /// * `message` - operator message, logged on a clean shutdown
    pub async fn shutdown(&mut self, reason: ShutdownReason, message: Option<&str>) -> ShutdownReason {
        shutdown_sequence(
            &mut self.session,
            self.dispatcher.as_mut(),
            &self.chat,
            reason,
            message,
        )
        .await
    }
}
