//! Controller lifecycle: bootstrap, tick loop and shutdown.

pub mod bootstrap;
pub mod core;
pub mod shutdown;
pub mod tick;

pub use bootstrap::{Handshake, HandshakeStep, StepOutcome, API_VERSION, SCRIPT_CALLBACKS_SETTING};
pub use self::core::Controller;
pub use shutdown::{shutdown_sequence, ShutdownHandle, ShutdownReason, ShutdownRequest};
pub use tick::{drift_compensated_sleep, TickScheduler, TICK_PERIOD};
