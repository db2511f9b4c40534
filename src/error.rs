//! Error types for the certrun verification harness.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by collaborators and stages.
///
/// Every variant is a hard failure when it reaches the sequencer. Polling stages
/// swallow the transient ones before that happens.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("DNS provider error: {0}")]
    DnsApi(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("Manifest error for {path:?}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Timed out after {elapsed:?} ({attempts} attempts) waiting for {what}")]
    PollTimeout {
        what: String,
        attempts: u64,
        elapsed: Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for HarnessError {
    fn from(err: config::ConfigError) -> Self {
        HarnessError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(err: reqwest::Error) -> Self {
        map_http_error(err)
    }
}

fn map_http_error(error: reqwest::Error) -> HarnessError {
    if error.is_timeout() {
        HarnessError::Http(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        HarnessError::Http(format!("Connection error: {}", error))
    } else {
        HarnessError::Http(error.to_string())
    }
}

impl HarnessError {
    /// Short category used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::Config(_) => "config",
            HarnessError::CommandSpawn { .. } => "command-spawn",
            HarnessError::CommandFailed { .. } => "command-failed",
            HarnessError::DnsApi(_) => "dns-api",
            HarnessError::Http(_) => "http",
            HarnessError::Decode { .. } => "decode",
            HarnessError::Manifest { .. } => "manifest",
            HarnessError::Assertion(_) => "assertion",
            HarnessError::PollTimeout { .. } => "timeout",
            HarnessError::Io(_) => "io",
        }
    }
}
