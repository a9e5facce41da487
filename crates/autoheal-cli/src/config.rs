//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default configuration file
pub const DEFAULT_CONFIG: &str = "autoheal.yaml";

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Log filter directive when `AUTOHEAL_LOG_LEVEL` is unset
    #[must_use]
    pub const fn default_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Autoheal configuration file
    pub config_path: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
            config_path: PathBuf::from(DEFAULT_CONFIG),
        }
    }
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set the configuration file
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Load the autoheal configuration.
    ///
    /// A missing file at the default location means built-in defaults; a
    /// missing file that was asked for explicitly is an error.
    pub fn load(&self) -> crate::CliResult<autoheal::Config> {
        if !self.config_path.exists() && self.config_path == std::path::Path::new(DEFAULT_CONFIG) {
            return Ok(autoheal::Config::default());
        }
        autoheal::Config::load(&self.config_path).map_err(|e| crate::CliError::config(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_default_verbosity() {
            assert_eq!(Verbosity::default(), Verbosity::Normal);
        }

        #[test]
        fn test_is_quiet() {
            assert!(Verbosity::Quiet.is_quiet());
            assert!(!Verbosity::Normal.is_quiet());
        }

        #[test]
        fn test_is_verbose() {
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Verbose.is_verbose());
            assert!(Verbosity::Debug.is_verbose());
        }

        #[test]
        fn test_default_filter() {
            assert_eq!(Verbosity::Quiet.default_filter(), "error");
            assert_eq!(Verbosity::Debug.default_filter(), "debug");
        }
    }

    mod color_choice_tests {
        use super::*;

        #[test]
        fn test_default_color() {
            assert_eq!(ColorChoice::default(), ColorChoice::Auto);
        }

        #[test]
        fn test_should_color_fixed() {
            assert!(ColorChoice::Always.should_color());
            assert!(!ColorChoice::Never.should_color());
        }
    }

    mod cli_config_tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_builder() {
            let config = CliConfig::new()
                .with_verbosity(Verbosity::Quiet)
                .with_color(ColorChoice::Never)
                .with_config_path("ci/autoheal.yaml");
            assert!(config.verbosity.is_quiet());
            assert_eq!(config.color, ColorChoice::Never);
            assert_eq!(config.config_path, PathBuf::from("ci/autoheal.yaml"));
        }

        #[test]
        fn test_explicit_missing_file_is_error() {
            let config = CliConfig::new().with_config_path("/nonexistent/autoheal.yaml");
            assert!(config.load().is_err());
        }

        #[test]
        fn test_loads_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("autoheal.yaml");
            std::fs::write(&path, "artifact_store:\n  path: out\n").unwrap();
            let loaded = CliConfig::new().with_config_path(&path).load().unwrap();
            assert_eq!(loaded.artifact_store.path, PathBuf::from("out"));
        }
    }
}
