//! Configuration module for the command server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::framer::DEFAULT_READ_BUFFER_SIZE;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the command server
#[derive(Parser, Debug)]
#[command(name = "cmdsock")]
#[command(version)]
#[command(about = "A newline-delimited JSON command server on a Unix socket", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Filesystem path of the Unix domain socket
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Permission bits applied to the socket file, in octal (e.g. 600)
    #[arg(long)]
    pub socket_mode: Option<String>,

    /// Bytes requested per socket read (does not limit message size)
    #[arg(short = 'b', long)]
    pub read_buffer_size: Option<usize>,

    /// Seconds to wait for open connections to finish on shutdown
    #[arg(short = 'g', long)]
    pub shutdown_grace: Option<u64>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Filesystem path of the Unix domain socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Permission bits for the socket file (write as `0o600`)
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,
    /// Bytes requested per socket read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Shutdown grace period in seconds
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            socket_mode: default_socket_mode(),
            read_buffer_size: default_read_buffer_size(),
            shutdown_grace_secs: default_shutdown_grace(),
            workers: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/python_server.sock")
}

fn default_socket_mode() -> u32 {
    0o600
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub socket_path: PathBuf,
    pub socket_mode: u32,
    pub read_buffer_size: usize,
    pub shutdown_grace: Duration,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            socket_path: server.socket_path,
            socket_mode: server.socket_mode,
            read_buffer_size: server.read_buffer_size,
            shutdown_grace: Duration::from_secs(server.shutdown_grace_secs),
            workers: server.workers,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they name.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        let socket_mode = match cli.socket_mode {
            Some(ref mode) => parse_mode(mode)?,
            None => toml_config.server.socket_mode,
        };

        let config = Config {
            socket_path: cli.socket.unwrap_or(toml_config.server.socket_path),
            socket_mode,
            read_buffer_size: cli
                .read_buffer_size
                .unwrap_or(toml_config.server.read_buffer_size),
            shutdown_grace: Duration::from_secs(
                cli.shutdown_grace
                    .unwrap_or(toml_config.server.shutdown_grace_secs),
            ),
            workers: cli.workers.or(toml_config.server.workers),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.socket_mode > 0o777 {
            return Err(ConfigError::Invalid(format!(
                "socket_mode {:o} is not a valid permission mode",
                self.socket_mode
            )));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid(
                "workers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an octal permission mode such as `600`, `0600` or `0o600`.
fn parse_mode(mode: &str) -> Result<u32, ConfigError> {
    let digits = mode.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .map_err(|_| ConfigError::Invalid(format!("socket mode '{mode}' is not octal")))
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
