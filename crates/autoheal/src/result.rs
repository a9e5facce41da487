//! Result and error types for Autoheal.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Autoheal operations
pub type HealResult<T> = Result<T, HealError>;

/// Errors that can occur in Autoheal
#[derive(Debug, Error)]
pub enum HealError {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// No proposal strategy is registered for the platform
    #[error("Unsupported platform: no proposal strategy registered for '{platform}'")]
    UnsupportedPlatform {
        /// Platform tag
        platform: String,
    },

    /// Target artifact declares more than one `LOCATOR = ...` line
    #[error("{path}: {count} LOCATOR assignments found, expected at most one")]
    AmbiguousSentinel {
        /// Target artifact
        path: PathBuf,
        /// Number of sentinel lines
        count: usize,
    },

    /// Artifact store failure
    #[error("Artifact '{name}' failed: {message}")]
    Artifact {
        /// Artifact name
        name: String,
        /// Error message
        message: String,
    },

    /// Ledger sink failure
    #[error("Ledger write failed: {message}")]
    Ledger {
        /// Error message
        message: String,
    },

    /// Invalid regex or glob in a configured pattern list
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern {
        /// Offending pattern
        pattern: String,
        /// Error message
        message: String,
    },

    /// Invalid input to an operation
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HealError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unsupported-platform error
    #[must_use]
    pub fn unsupported_platform(platform: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            platform: platform.into(),
        }
    }

    /// Create an artifact error
    #[must_use]
    pub fn artifact(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Artifact {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a ledger error
    #[must_use]
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
