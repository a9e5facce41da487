//! Test execution.
//!
//! Every failure of a test entry point, including a panic or a process that
//! cannot be spawned, is reported as a failed [`TestOutcome`] with a
//! `Kind: message` error string. Nothing propagates to the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Pass/fail result of one test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Whether the test passed
    pub passed: bool,
    /// `Kind: message` on failure
    pub error: Option<String>,
}

impl TestOutcome {
    /// A passing run
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            error: None,
        }
    }

    /// A failing run
    #[must_use]
    pub fn fail(kind: &str, message: impl std::fmt::Display) -> Self {
        Self {
            passed: false,
            error: Some(format!("{kind}: {message}")),
        }
    }
}

/// Runs a named test unit, reloading it so a just-applied patch is seen
pub trait TestExecutor {
    /// Run the test
    fn run(&self, test_id: &str) -> TestOutcome;
}

/// Runs tests as external processes.
///
/// `{test}` in the command template is replaced by the test identifier.
/// A fresh process per run picks up the patched artifact.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    template: String,
    workdir: PathBuf,
}

impl CommandExecutor {
    /// Create an executor running `template` in `workdir`
    #[must_use]
    pub fn new(template: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            workdir: workdir.into(),
        }
    }

    /// Argument vector for a test
    #[must_use]
    pub fn argv(&self, test_id: &str) -> Vec<String> {
        self.template
            .split_whitespace()
            .map(|part| part.replace("{test}", test_id))
            .collect()
    }
}

impl TestExecutor for CommandExecutor {
    fn run(&self, test_id: &str) -> TestOutcome {
        let argv = self.argv(test_id);
        let Some((program, args)) = argv.split_first() else {
            return TestOutcome::fail("SpawnError", "empty test command");
        };
        debug!(program = %program, ?args, workdir = %self.workdir.display(), "Running test");

        let output = match Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .output()
        {
            Ok(output) => output,
            Err(e) => return TestOutcome::fail("SpawnError", format!("{program}: {e}")),
        };

        if output.status.success() {
            return TestOutcome::pass();
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = |text: &str| {
            text.lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(str::to_string)
        };
        let last = last_line(&stderr)
            .or_else(|| last_line(&stdout))
            .unwrap_or_else(|| "no output".to_string());
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        TestOutcome::fail("ExitStatus", format!("{code}: {}", last.trim()))
    }
}

type TestFn = Box<dyn Fn() -> bool>;

/// In-process registry of named test functions.
///
/// A function returning `false` means the locator was not found.
#[derive(Default)]
pub struct FnExecutor {
    tests: HashMap<String, TestFn>,
}

impl std::fmt::Debug for FnExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tests.keys().collect();
        names.sort();
        f.debug_struct("FnExecutor").field("tests", &names).finish()
    }
}

impl FnExecutor {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test function
    #[must_use]
    pub fn with_test<F>(mut self, name: impl Into<String>, test: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.tests.insert(name.into(), Box::new(test));
        self
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl TestExecutor for FnExecutor {
    fn run(&self, test_id: &str) -> TestOutcome {
        let Some(test) = self.tests.get(test_id) else {
            return TestOutcome::fail("NotFound", format!("no test registered as '{test_id}'"));
        };
        match catch_unwind(AssertUnwindSafe(test)) {
            Ok(true) => TestOutcome::pass(),
            Ok(false) => TestOutcome::fail("AssertionFailed", "locator not found"),
            Err(payload) => TestOutcome::fail("Panic", panic_message(payload.as_ref())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod fn_executor_tests {
        use super::*;

        #[test]
        fn test_pass_and_fail() {
            let ex = FnExecutor::new()
                .with_test("ok", || true)
                .with_test("broken", || false);
            assert_eq!(ex.run("ok"), TestOutcome::pass());
            assert_eq!(
                ex.run("broken").error.as_deref(),
                Some("AssertionFailed: locator not found")
            );
        }

        #[test]
        fn test_panic_is_converted() {
            let ex = FnExecutor::new().with_test("boom", || panic!("element vanished"));
            let outcome = ex.run("boom");
            assert!(!outcome.passed);
            assert_eq!(outcome.error.as_deref(), Some("Panic: element vanished"));
        }

        #[test]
        fn test_formatted_panic_is_converted() {
            let ex = FnExecutor::new().with_test("boom", || panic!("missing {}", "btnOld"));
            assert_eq!(ex.run("boom").error.as_deref(), Some("Panic: missing btnOld"));
        }

        #[test]
        fn test_unknown_test() {
            let outcome = FnExecutor::new().run("nope");
            assert!(outcome.error.unwrap().starts_with("NotFound:"));
        }
    }

    mod command_executor_tests {
        use super::*;

        #[test]
        fn test_argv_substitutes_test_id() {
            let ex = CommandExecutor::new("python -m pytest -q {test}", ".");
            assert_eq!(
                ex.argv("tests/failing_test.py"),
                vec!["python", "-m", "pytest", "-q", "tests/failing_test.py"]
            );
        }

        #[test]
        fn test_spawn_error() {
            let ex = CommandExecutor::new("definitely-not-a-real-binary-7f3a {test}", ".");
            let outcome = ex.run("x");
            assert!(!outcome.passed);
            assert!(outcome.error.unwrap().starts_with("SpawnError:"));
        }

        #[test]
        fn test_empty_template() {
            let outcome = CommandExecutor::new("   ", ".").run("x");
            assert_eq!(outcome.error.as_deref(), Some("SpawnError: empty test command"));
        }

        #[cfg(unix)]
        #[test]
        fn test_exit_status_pass_and_fail() {
            assert!(CommandExecutor::new("true", ".").run("x").passed);
            let outcome = CommandExecutor::new("false", ".").run("x");
            assert_eq!(outcome.error.as_deref(), Some("ExitStatus: 1: no output"));
        }
    }
}
