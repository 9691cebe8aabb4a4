//! # Steward Core - Dedicated Server Controller
//!
//! The lifecycle engine behind the `steward` controller. It attaches to a
//! remote dedicated game server over a request/response protocol, brings the
//! remote session into a controllable state and then drives a cooperative
//! tick loop until an operator asks it to stop.
//!
//! ## Lifecycle
//!
//! 1. **Bootstrap** ([`server::Handshake`]) - connect, authenticate, enable
//!    callbacks, wait for the server to be ready, then negotiate optional
//!    features. Steps 1-4 are load-bearing; the rest degrade gracefully.
//! 2. **Tick loop** ([`server::TickScheduler`]) - once every 300 ms give the
//!    dispatch subsystem a chance to run due callbacks, sleeping only the
//!    remainder of the period.
//! 3. **Shutdown** ([`server::shutdown_sequence`]) - the single, idempotent
//!    teardown path. It never escalates secondary failures.
//!
//! The exit decision is made once, by the caller of
//! [`Controller::start`], from the returned [`ShutdownReason`].
//!
//! ## Collaborators
//!
//! Everything the lifecycle talks to sits behind a trait so it can be
//! swapped out in tests:
//!
//! * [`Transport`] / [`Connector`] - the remote procedure channel
//! * [`StatusProbe`] - server status polling and game mode lookup
//! * [`EventDispatcher`] - the callback/event dispatch subsystem
//!
//! The [`chat`] and [`backup`] modules are plain utilities.
//!
//! ## Threading
//!
//! The controller task exclusively owns the [`ConnectionSession`] and the
//! transport inside it. Other tasks (signal handlers, operators) only ever
//! hold a [`ShutdownHandle`].

pub use config::{ControllerConfig, ServerEndpoint};
pub use dispatch::{CallbackManager, ControllerEvent, DispatchError, EventDispatcher};
pub use error::BootstrapError;
pub use server::{Controller, ShutdownHandle, ShutdownReason};
pub use session::{ConnectionSession, SessionState};
pub use status::{RemoteStatusProbe, StatusProbe};
pub use transport::{Connector, JsonLineConnector, RemoteCallback, Transport, TransportError};

pub mod backup;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod server;
pub mod session;
pub mod status;
pub mod testing;
pub mod transport;

/// Name announced in chat and logs.
pub const CONTROLLER_NAME: &str = "Steward";

/// Controller version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
