//! Steward entry point.
//!
//! Loads configuration, sets up logging and signal handling, then hands
//! control to the core [`Controller`]. The process exit code is decided
//! here and nowhere else.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use steward_core::backup::perform_full_backup;
use steward_core::dispatch::{CallbackManager, ControllerEvent};
use steward_core::{
    Controller, JsonLineConnector, ShutdownHandle, ShutdownReason, CONTROLLER_NAME, VERSION,
};
use tracing::{debug, error, info, warn};

use cli::CliArgs;
use config::{AppConfig, ConfigError};
use logging::setup_logging;
use signals::wait_for_termination;

/// Exit code when a second signal cuts the shutdown short.
const FORCED_EXIT_CODE: i32 = 130;

struct Application {
    config: AppConfig,
    backup: bool,
}

impl Application {
    async fn new(args: CliArgs) -> Result<Self> {
        // Configuration comes first; logging depends on it.
        let mut config = AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("loading {}", args.config_path.display()))?;
        config.apply_args(&args);
        config.validate().map_err(ConfigError::Invalid)?;

        setup_logging(&config.logging)?;
        info!("{} v{}", CONTROLLER_NAME, VERSION);
        info!(
            "Config: {} | Server: {}:{}",
            args.config_path.display(),
            config.server.host,
            config.server.port
        );

        Ok(Self {
            config,
            backup: args.backup,
        })
    }

    async fn run(self) -> Result<ShutdownReason> {
        if self.backup {
            self.perform_backup().await;
        }

        let mut controller = Controller::new(
            self.config.to_controller_config(),
            JsonLineConnector::default(),
            core_listeners(),
        );

        let handle = controller.shutdown_handle();
        tokio::spawn(async move {
            if let Some(signal) = watch_signals(handle, wait_for_termination).await {
                warn!("Received {} again, exiting immediately", signal);
                std::process::exit(FORCED_EXIT_CODE);
            }
        });

        Ok(controller.start().await)
    }

    async fn perform_backup(&self) {
        let source = self.config.backup_source();
        let directory = self.config.backup_directory();
        let excludes = self.config.backup.excludes.clone();

        let result = tokio::task::spawn_blocking(move || {
            perform_full_backup(&source, &directory, VERSION, &excludes)
        })
        .await;

        match result {
            Ok(Ok(path)) => info!("Backup created: {}", path.display()),
            Ok(Err(e)) => warn!("Backup failed: {}", e),
            Err(e) => warn!("Backup task failed: {}", e),
        }
    }
}

/// Turns the first signal into a shutdown request, then waits for another.
///
/// # Returns
/// * `Some(signal)` - a second signal arrived before the controller finished
/// * `None` - signals could not be watched
async fn watch_signals<S, F>(handle: ShutdownHandle, mut next_signal: S) -> Option<&'static str>
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<&'static str>>,
{
    match next_signal().await {
        Ok(signal) => handle.request_shutdown(Some(format!("Received {signal}"))),
        Err(e) => {
            error!("Failed to install signal handlers: {}", e);
            return None;
        }
    }
    next_signal().await.ok()
}

/// Listeners every controller instance runs with.
fn core_listeners() -> CallbackManager {
    let mut manager = CallbackManager::new();

    manager.on_callback("ManiaPlanet.PlayerConnect", |callback| {
        let login = callback.params.first().and_then(|login| login.as_str());
        info!("Player connected: {}", login.unwrap_or("<unknown>"));
        Ok(())
    });
    manager.on_callback("ManiaPlanet.PlayerDisconnect", |callback| {
        let login = callback.params.first().and_then(|login| login.as_str());
        info!("Player disconnected: {}", login.unwrap_or("<unknown>"));
        Ok(())
    });
    manager.on_event(ControllerEvent::Shutdown, |_| {
        debug!("Releasing listeners");
        Ok(())
    });
    manager.every("heartbeat", Duration::from_secs(60), || {
        debug!("Controller alive");
        Ok(())
    });

    manager
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to start {}: {:?}", CONTROLLER_NAME, e);
            std::process::exit(ShutdownReason::BootstrapFailure.exit_code());
        }
    };

    match app.run().await {
        Ok(reason) => std::process::exit(reason.exit_code()),
        Err(e) => {
            error!("Application error: {:?}", e);
            std::process::exit(ShutdownReason::BootstrapFailure.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    fn scripted(signals: Vec<io::Result<&'static str>>) -> impl FnMut() -> std::future::Ready<io::Result<&'static str>> {
        let mut signals = VecDeque::from(signals);
        move || {
            std::future::ready(
                signals
                    .pop_front()
                    .unwrap_or_else(|| Err(io::Error::other("no more signals"))),
            )
        }
    }

    #[tokio::test]
    async fn test_first_signal_requests_shutdown() {
        let handle = ShutdownHandle::new();
        let forced = watch_signals(handle.clone(), scripted(vec![Ok("SIGTERM")])).await;

        assert!(forced.is_none());
        assert_eq!(handle.message().as_deref(), Some("Received SIGTERM"));
    }

    #[tokio::test]
    async fn test_second_signal_forces_exit() {
        let handle = ShutdownHandle::new();
        let forced =
            watch_signals(handle.clone(), scripted(vec![Ok("SIGINT"), Ok("SIGINT")])).await;

        assert_eq!(forced, Some("SIGINT"));
        assert!(handle.is_requested());
    }

    #[tokio::test]
    async fn test_unwatchable_signals_request_nothing() {
        let handle = ShutdownHandle::new();
        let forced = watch_signals(
            handle.clone(),
            scripted(vec![Err(io::Error::other("unsupported"))]),
        )
        .await;

        assert!(forced.is_none());
        assert!(!handle.is_requested());
    }

    #[test]
    fn test_core_listeners_registered() {
        assert_eq!(core_listeners().stats().total_listeners, 4);
    }
}
