//! Tracing subscriber setup for binaries and demos embedding the engine

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AssignmentError, Result};

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`); `RUST_LOG` adds to it
    pub level: String,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log span open/close events
    pub log_spans: bool,
    /// Application name logged at startup
    pub app_name: String,
    /// Write to stderr instead of stdout
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "leadflow".to_string(),
            stderr: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: impl Into<String>, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level: level.into(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Keep stdout free for command output
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }
}

/// Install the global subscriber
///
/// Fails with a configuration error for an unknown level or when a subscriber
/// is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = match (config.json, config.stderr) {
        (true, true) => subscriber.with_writer(std::io::stderr).json().try_init(),
        (true, false) => subscriber.with_writer(std::io::stdout).json().try_init(),
        (false, true) => subscriber.with_writer(std::io::stderr).try_init(),
        (false, false) => subscriber.try_init(),
    };
    installed.map_err(|e| AssignmentError::configuration(format!("logging already initialised: {}", e)))?;

    tracing::info!("Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| AssignmentError::configuration(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_builder_flags() {
        let config = LoggingConfig::new("debug", "sweeper").with_json().with_file_info();
        assert!(config.json);
        assert!(config.file_info);
        assert!(!config.log_spans);
        assert_eq!(config.app_name, "sweeper");
    }

    #[test]
    #[serial]
    fn test_second_install_is_rejected() {
        // Whichever call installs first, a second install always fails
        let _ = setup_logging(&LoggingConfig::default());
        assert!(setup_logging(&LoggingConfig::default()).is_err());
    }

    #[test]
    #[serial]
    fn test_bad_level_fails_before_install() {
        let config = LoggingConfig::new("chatty", "leadflow");
        assert!(matches!(setup_logging(&config), Err(AssignmentError::Configuration(_))));
    }
}
