//! Shutdown requests and the teardown sequence.
//!
//! Any task may ask for a shutdown through a [`ShutdownHandle`]; the request
//! is only recorded. The controller task notices it at the next tick
//! boundary and runs [`shutdown_sequence`], the one teardown path for every
//! way the process can end.

use crate::chat::Chat;
use crate::dispatch::{ControllerEvent, EventDispatcher};
use crate::session::ConnectionSession;
use crate::CONTROLLER_NAME;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why the controller is stopping. Mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A signal or operator asked to stop. Exit code 0.
    OperatorRequested,
    /// A load-bearing handshake step failed. Exit code 1.
    BootstrapFailure,
    /// Dispatch lost the connection during the tick loop. Exit code 2.
    FatalLoopError,
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::OperatorRequested => 0,
            ShutdownReason::BootstrapFailure => 1,
            ShutdownReason::FatalLoopError => 2,
        }
    }

    /// Whether the stop was asked for rather than forced by a failure.
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownReason::OperatorRequested)
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownReason::OperatorRequested => "operator requested",
            ShutdownReason::BootstrapFailure => "bootstrap failure",
            ShutdownReason::FatalLoopError => "fatal loop error",
        };
        f.write_str(name)
    }
}

/// A recorded shutdown request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub message: Option<String>,
}

/// Cloneable, thread-safe trigger for a controller shutdown.
///
/// The first request wins; later ones (and their messages) are ignored.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<Option<ShutdownRequest>>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Records a shutdown request. Never blocks and never touches the
    /// transport.
    pub fn request_shutdown(&self, message: Option<String>) {
        self.tx.send_modify(|request| match request {
            Some(_) => debug!("Shutdown already requested"),
            None => {
                info!("Shutdown requested");
                *request = Some(ShutdownRequest { message });
            }
        });
    }

    pub fn is_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Message attached to the first request, if any.
    pub fn message(&self) -> Option<String> {
        self.tx
            .borrow()
            .as_ref()
            .and_then(|request| request.message.clone())
    }

    /// Completes once a shutdown has been requested.
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(Option::is_some).await;
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Tears the controller down and returns `reason`.
///
/// Every step is best-effort. Steps that need the remote server only run
/// while a live transport exists. Calling this on an already terminated
/// session does nothing but log.
pub async fn shutdown_sequence(
    session: &mut ConnectionSession,
    dispatcher: &mut dyn EventDispatcher,
    chat: &Chat,
    reason: ShutdownReason,
    message: Option<&str>,
) -> ShutdownReason {
    if session.is_terminated() {
        info!("Already shut down, ignoring {} shutdown", reason);
        return reason;
    }
    info!("Shutting down ({})...", reason);

    dispatcher.notify(ControllerEvent::Shutdown).await;

    if session.is_connected() {
        let text = format!("{} shutting down.", CONTROLLER_NAME);
        if let Err(e) = chat.announce(session, &text).await {
            warn!("Couldn't announce shutdown: {}", e);
        }
        if let Err(e) = session.call("SendHideManialinkPage", Vec::new()).await {
            warn!("Couldn't hide overlays: {}", e);
        }
    } else {
        debug!("No live connection, skipping remote shutdown steps");
    }

    // Failures were logged where they happened.
    if let Some(message) = message.filter(|message| !message.is_empty()) {
        if reason.is_clean() {
            info!("{}", message);
        } else {
            debug!("Shutdown cause: {}", message);
        }
    }

    if session.terminate().await {
        debug!("Transport terminated");
    }

    if reason.is_clean() {
        info!("Quitting {}!", CONTROLLER_NAME);
    } else {
        warn!("Quitting {} ({})!", CONTROLLER_NAME, reason);
    }
    reason
}
