//! Configuration management for the steward controller.
//!
//! Loads the TOML configuration file, applies command-line overrides and
//! converts the result into the core's [`ControllerConfig`].

use crate::cli::CliArgs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use steward_core::backup::DEFAULT_EXCLUDES;
use steward_core::chat::ChatSettings;
use steward_core::{ControllerConfig, ServerEndpoint};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Couldn't write default configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration validation failed: {0}")]
    Invalid(String),
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    pub logging: LoggingSettings,
    #[serde(default)]
    pub backup: BackupSettings,
}

/// The dedicated server to control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    /// Remote control port (the dedicated server's XML-RPC port)
    pub port: u16,
    pub login: String,
    pub password: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// How long to wait for the server to become playable
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    20
}

fn default_ready_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Where archives are written
    pub directory: String,
    /// Directory tree to archive
    pub source: String,
    /// Entry names skipped at every level
    pub excludes: Vec<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            directory: "backup".to_string(),
            source: ".".to_string(),
            excludes: DEFAULT_EXCLUDES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 5000,
                login: "SuperAdmin".to_string(),
                password: "SuperAdmin".to_string(),
                connect_timeout_secs: default_connect_timeout(),
                ready_timeout_secs: default_ready_timeout(),
            },
            chat: ChatSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            backup: BackupSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written
    /// to `path` and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.host.trim().is_empty() {
            return Err("Server host cannot be empty".to_string());
        }
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }
        if self.server.login.is_empty() || self.server.password.is_empty() {
            return Err("Server login and password are required".to_string());
        }
        if self.server.connect_timeout_secs == 0 || self.server.ready_timeout_secs == 0 {
            return Err("Timeouts must be greater than zero".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            endpoint: ServerEndpoint::new(
                self.server.host.clone(),
                self.server.port,
                self.server.login.clone(),
                self.server.password.clone(),
            ),
            connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
            ready_timeout: Duration::from_secs(self.server.ready_timeout_secs),
            chat: self.chat.clone(),
            ..ControllerConfig::default()
        }
    }

    pub fn backup_source(&self) -> PathBuf {
        PathBuf::from(&self.backup.source)
    }

    pub fn backup_directory(&self) -> PathBuf {
        PathBuf::from(&self.backup.directory)
    }
}
