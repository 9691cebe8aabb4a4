//! The connection handshake.
//!
//! Turns a fresh transport into a session ready for steady-state operation.
//! The first four steps are load-bearing and abort the handshake on failure;
//! the remaining ones negotiate optional features and only ever degrade.
//!
//! Every step reports a [`StepOutcome`] and [`Handshake::run`] alone decides
//! what happens next.

use crate::config::ControllerConfig;
use crate::error::BootstrapError;
use crate::session::{ConnectionSession, SessionState};
use crate::status::{StatusProbe, GAME_MODE_SCRIPT, STATUS_RUNNING_PLAY};
use crate::transport::Connector;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Protocol revision requested from the server.
pub const API_VERSION: &str = "2013-04-16";

/// Mode script setting that turns on script callbacks.
pub const SCRIPT_CALLBACKS_SETTING: &str = "S_UseScriptCallbacks";

/// Handshake steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Validate the endpoint and open the transport
    Connect,
    /// Log in with the configured credentials
    Authenticate,
    /// Ask the server to push callbacks
    EnableCallbacks,
    /// Poll until the server is running a map
    AwaitServerReady,
    /// Request [`API_VERSION`]; the session becomes `Ready` either way
    SetApiVersion,
    /// Clear overlays left by a previous controller
    HideOverlays,
    /// Turn on [`SCRIPT_CALLBACKS_SETTING`] in script mode
    EnableScriptCallbacks,
}

impl HandshakeStep {
    /// Execution order.
    pub const ORDER: [HandshakeStep; 7] = [
        HandshakeStep::Connect,
        HandshakeStep::Authenticate,
        HandshakeStep::EnableCallbacks,
        HandshakeStep::AwaitServerReady,
        HandshakeStep::SetApiVersion,
        HandshakeStep::HideOverlays,
        HandshakeStep::EnableScriptCallbacks,
    ];

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeStep::Connect => "connect",
            HandshakeStep::Authenticate => "authenticate",
            HandshakeStep::EnableCallbacks => "enable-callbacks",
            HandshakeStep::AwaitServerReady => "await-server-ready",
            HandshakeStep::SetApiVersion => "set-api-version",
            HandshakeStep::HideOverlays => "hide-overlays",
            HandshakeStep::EnableScriptCallbacks => "enable-script-callbacks",
        }
    }

    /// Whether a failure of this step aborts the handshake.
    pub fn is_load_bearing(&self) -> bool {
        matches!(
            self,
            HandshakeStep::Connect
                | HandshakeStep::Authenticate
                | HandshakeStep::EnableCallbacks
                | HandshakeStep::AwaitServerReady
        )
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a single handshake step.
#[derive(Debug)]
pub enum StepOutcome {
    /// The step did everything it set out to do.
    Completed,
    /// The step failed but the session is still usable.
    Degraded(String),
    /// The step failed. Aborts the handshake for load-bearing steps.
    Fatal(BootstrapError),
}

/// Drives a [`ConnectionSession`] from `Disconnected` to `Ready`.
pub struct Handshake<'a> {
    config: &'a ControllerConfig,
    connector: &'a dyn Connector,
    probe: &'a mut dyn StatusProbe,
}

impl<'a> Handshake<'a> {
    /// Borrows everything the steps need for one run.
    pub fn new(
        config: &'a ControllerConfig,
        connector: &'a dyn Connector,
        probe: &'a mut dyn StatusProbe,
    ) -> Self {
        Self {
            config,
            connector,
            probe,
        }
    }

    /// Runs every step in order.
    ///
    /// # Returns
    /// * `Ok(())` - the session is `Ready`; optional features may be missing
    /// * `Err(BootstrapError)` - a load-bearing step failed. The failure is
    ///   logged here, once, with the step name and remote error code.
    pub async fn run(&mut self, session: &mut ConnectionSession) -> Result<(), BootstrapError> {
        for step in HandshakeStep::ORDER {
            let outcome = self.run_step(step, session).await;
            settle(step, outcome)?;
        }
        Ok(())
    }

    /// Runs a single step and reports its outcome without acting on it.
    ///
    /// Steps must run in [`HandshakeStep::ORDER`]; each one expects the
    /// session state the previous step left behind.
    pub async fn run_step(
        &mut self,
        step: HandshakeStep,
        session: &mut ConnectionSession,
    ) -> StepOutcome {
        let result = match step {
            HandshakeStep::Connect => self.connect(session).await,
            HandshakeStep::Authenticate => self.authenticate(session).await,
            HandshakeStep::EnableCallbacks => self.enable_callbacks(session).await,
            HandshakeStep::AwaitServerReady => self.await_server_ready(session).await,
            HandshakeStep::SetApiVersion => self.set_api_version(session).await,
            HandshakeStep::HideOverlays => self.hide_overlays(session).await,
            HandshakeStep::EnableScriptCallbacks => self.enable_script_callbacks(session).await,
        };
        result.unwrap_or_else(StepOutcome::Fatal)
    }

    async fn connect(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<StepOutcome, BootstrapError> {
        let endpoint = &self.config.endpoint;
        endpoint.validate()?;
        session.transition(SessionState::Connecting)?;

        info!("Connecting to server at {}...", endpoint.address());
        let transport = self
            .connector
            .connect(&endpoint.host, endpoint.port, self.config.connect_timeout)
            .await
            .map_err(BootstrapError::Connect)?;
        session.attach_transport(transport);

        info!("Connected to {}", endpoint.address());
        Ok(StepOutcome::Completed)
    }

    async fn authenticate(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<StepOutcome, BootstrapError> {
        let endpoint = &self.config.endpoint;
        session
            .call(
                "Authenticate",
                vec![json!(endpoint.login), json!(endpoint.password)],
            )
            .await
            .map_err(|source| BootstrapError::Authenticate {
                login: endpoint.login.clone(),
                source,
            })?;
        session.transition(SessionState::Authenticated)?;

        info!("Authenticated as '{}'", endpoint.login);
        Ok(StepOutcome::Completed)
    }

    async fn enable_callbacks(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<StepOutcome, BootstrapError> {
        session
            .call("EnableCallbacks", vec![json!(true)])
            .await
            .map_err(BootstrapError::EnableCallbacks)?;
        session.transition(SessionState::CallbacksEnabled)?;
        Ok(StepOutcome::Completed)
    }

    async fn await_server_ready(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<StepOutcome, BootstrapError> {
        let budget = self.config.ready_timeout;
        let ready = self
            .probe
            .wait_for_status(session, STATUS_RUNNING_PLAY, budget)
            .await
            .map_err(BootstrapError::StatusQuery)?;

        if !ready {
            return Err(BootstrapError::ServerNotReady(budget));
        }
        Ok(StepOutcome::Completed)
    }

    async fn set_api_version(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<StepOutcome, BootstrapError> {
        let outcome = match session.call("SetApiVersion", vec![json!(API_VERSION)]).await {
            Ok(_) => {
                session.set_api_version_accepted(true);
                StepOutcome::Completed
            }
            Err(e) => StepOutcome::Degraded(format!(
                "Couldn't set API version '{}'! {}",
                API_VERSION, e
            )),
        };

        // The session is usable with or without the requested revision.
        session.transition(SessionState::Ready)?;
        Ok(outcome)
    }

    async fn hide_overlays(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<StepOutcome, BootstrapError> {
        if let Err(e) = session.call("SendHideManialinkPage", Vec::new()).await {
            debug!("Hiding overlays failed: {}", e);
        }
        Ok(StepOutcome::Completed)
    }

    async fn enable_script_callbacks(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<StepOutcome, BootstrapError> {
        let mode = match self.probe.game_mode(session).await {
            Ok(mode) => mode,
            Err(e) => {
                return Ok(StepOutcome::Degraded(format!(
                    "Couldn't read game mode! {e}"
                )))
            }
        };
        if mode != GAME_MODE_SCRIPT {
            debug!("Game mode {} does not use script callbacks", mode);
            return Ok(StepOutcome::Completed);
        }

        let mut settings = match session.call("GetModeScriptSettings", Vec::new()).await {
            Ok(Value::Object(settings)) => settings,
            Ok(other) => {
                return Ok(StepOutcome::Degraded(format!(
                    "Unexpected mode script settings: {other}"
                )))
            }
            Err(e) => {
                return Ok(StepOutcome::Degraded(format!(
                    "Couldn't get mode script settings! {e}"
                )))
            }
        };

        if !settings.contains_key(SCRIPT_CALLBACKS_SETTING) {
            debug!("Mode script has no {} setting", SCRIPT_CALLBACKS_SETTING);
            return Ok(StepOutcome::Completed);
        }

        settings.insert(SCRIPT_CALLBACKS_SETTING.to_string(), Value::Bool(true));
        match session
            .call("SetModeScriptSettings", vec![Value::Object(settings)])
            .await
        {
            Ok(_) => {
                session.set_script_callbacks_enabled(true);
                Ok(StepOutcome::Completed)
            }
            Err(e) => Ok(StepOutcome::Degraded(format!(
                "Couldn't set mode script settings to enable script callbacks! {e}"
            ))),
        }
    }
}

/// Decides what a step outcome means for the handshake. Only a fatal
/// outcome of a load-bearing step aborts it.
fn settle(step: HandshakeStep, outcome: StepOutcome) -> Result<(), BootstrapError> {
    match outcome {
        StepOutcome::Completed => debug!("Handshake step {} completed", step),
        StepOutcome::Degraded(warning) => warn!(step = step.name(), "{}", warning),
        StepOutcome::Fatal(e) if step.is_load_bearing() => {
            error!(
                step = step.name(),
                code = e.remote_code().unwrap_or("-"),
                "Handshake failed: {}",
                e
            );
            return Err(e);
        }
        StepOutcome::Fatal(e) => {
            warn!(step = step.name(), "Optional handshake step failed: {}", e);
        }
    }
    Ok(())
}
