//! Status payloads on stdout, human-readable notes on stderr

use console::{style, Term};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Work done as asked
    Success,
    /// Done locally; publishing failed
    Partial,
    /// Nothing needed changing
    Noop,
    /// The command ran but its goal was not met
    Failed,
}

/// The one JSON object every command prints on stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Command status
    pub status: Status,
    /// Short human-readable summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StatusPayload {
    /// Payload with a status and message
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            fields: Map::new(),
        }
    }

    /// Payload with a status only
    #[must_use]
    pub fn bare(status: Status) -> Self {
        Self {
            status,
            message: None,
            fields: Map::new(),
        }
    }

    /// Add a field
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Pretty JSON
    pub fn render(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Print to stdout
    pub fn print(&self) -> serde_json::Result<()> {
        println!("{}", self.render()?);
        Ok(())
    }
}

/// Human-readable progress notes on stderr
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Verbose mode: per-file details are shown
    pub verbose: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Reporter {
    /// Create a reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// Show per-file details
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether `detail` lines are printed
    #[must_use]
    pub const fn shows_details(&self) -> bool {
        self.verbose && !self.quiet
    }

    fn line(&self, colored: console::StyledObject<&str>, plain: &str, message: &str) {
        let prefix = if self.use_color {
            colored.to_string()
        } else {
            plain.to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.line(style("✓").green().bold(), "OK", message);
        }
    }

    /// Print a failure message; shown even in quiet mode
    pub fn failure(&self, message: &str) {
        self.line(style("✗").red().bold(), "FAIL", message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            self.line(style("⚠").yellow().bold(), "WARN", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.line(style("ℹ").blue().bold(), "INFO", message);
        }
    }

    /// Print a detail line; verbose mode only
    pub fn detail(&self, message: &str) {
        if self.shows_details() {
            self.line(style("·").dim(), "  -", message);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    mod payload_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_flattened_fields() {
            let payload = StatusPayload::new(Status::Success, "Updated locally (no PR)").with("changed", 3);
            let v: Value = serde_json::from_str(&payload.render().unwrap()).unwrap();
            assert_eq!(
                v,
                json!({"status": "success", "message": "Updated locally (no PR)", "changed": 3})
            );
        }

        #[test]
        fn test_bare_has_no_message() {
            let v = serde_json::to_value(StatusPayload::bare(Status::Noop)).unwrap();
            assert_eq!(v, json!({"status": "noop"}));
        }

        #[test]
        fn test_status_tags() {
            for (status, tag) in [
                (Status::Success, "success"),
                (Status::Partial, "partial"),
                (Status::Noop, "noop"),
                (Status::Failed, "failed"),
            ] {
                assert_eq!(serde_json::to_value(status).unwrap(), json!(tag));
            }
        }
    }

    mod reporter_tests {
        use super::*;

        #[test]
        fn test_quiet_reporter_does_not_panic() {
            let reporter = Reporter::new(false, true);
            reporter.info("hidden");
            reporter.failure("shown");
        }

        #[test]
        fn test_details_need_verbose_and_not_quiet() {
            assert!(!Reporter::new(false, false).shows_details());
            assert!(Reporter::new(false, false).with_verbose(true).shows_details());
            assert!(!Reporter::new(false, true).with_verbose(true).shows_details());
        }
    }
}
