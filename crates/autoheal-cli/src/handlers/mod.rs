//! Command handlers - one module per subcommand
//!
//! Each handler returns the [`StatusPayload`] it wants printed; `main`
//! prints it. Hard errors are returned as [`CliError`](crate::CliError).

pub mod heal;
pub mod mappings;
pub mod rename;
pub mod run;

pub use heal::execute_heal;
pub use mappings::{execute_mappings_by_name, execute_mappings_from_app};
pub use rename::execute_text_rename;
pub use run::execute_run;

use autoheal::vcs::{PublishOutcome, PullRequestPublisher};
use autoheal::{ArtifactStore, Config, FsArtifactStore, JsonlLedger};
use std::path::Path;
use tracing::warn;

use crate::commands::PublishArgs;
use crate::output::{Reporter, Status, StatusPayload};
use crate::{CliConfig, CliResult};

/// Loaded configuration and the stores every command writes to
#[derive(Debug)]
pub struct Context {
    /// Autoheal configuration
    pub config: Config,
    /// Artifact store at `artifact_store.path`
    pub artifacts: FsArtifactStore,
    /// Ledger at `logging.patch_ledger`
    pub ledger: JsonlLedger,
    /// Stderr notes
    pub reporter: Reporter,
}

impl Context {
    /// Load configuration and open stores
    pub fn load(cli: &CliConfig) -> CliResult<Self> {
        let reporter = Reporter::new(cli.color.should_color(), cli.verbosity.is_quiet())
            .with_verbose(cli.verbosity.is_verbose());
        Self::from_config(cli.load()?, reporter)
    }

    /// Open stores for an already-loaded configuration
    pub fn from_config(config: Config, reporter: Reporter) -> CliResult<Self> {
        let artifacts = FsArtifactStore::new(&config.artifact_store.path)?;
        let ledger = JsonlLedger::new(&config.logging.patch_ledger);
        Ok(Self {
            config,
            artifacts,
            ledger,
            reporter,
        })
    }

    /// Store a serializable value; failures are logged and ignored
    pub fn store(&self, name: &str, value: &impl serde::Serialize) {
        let stored = serde_json::to_value(value)
            .map_err(autoheal::HealError::from)
            .and_then(|v| self.artifacts.put_json(name, &v));
        if let Err(e) = stored {
            warn!(artifact = name, error = %e, "Artifact write failed");
        }
    }

    /// Token from the command line, else from `vcs.github_token`
    #[must_use]
    pub fn github_token(&self, publish: &PublishArgs) -> Option<String> {
        publish
            .github_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| Some(self.config.vcs.github_token.clone()).filter(|t| !t.is_empty()))
    }

    /// Open one pull request for local changes, or report them as local.
    ///
    /// `local_message` is used when no token is available; `partial_message`
    /// when pushing or opening the pull request fails.
    pub fn publish(
        &self,
        repo: &Path,
        publish: &PublishArgs,
        title: &str,
        body: &str,
        local_message: &str,
        partial_message: &str,
    ) -> StatusPayload {
        let Some(token) = self.github_token(publish) else {
            self.reporter.success(local_message);
            return StatusPayload::new(Status::Success, local_message);
        };
        let publisher = PullRequestPublisher::from_config(repo, &self.config.vcs, &token);
        match publisher.publish(&publish.branch, title, body) {
            PublishOutcome::Opened { url, pr } => {
                self.store("pull_request.json", &pr);
                self.reporter.success(&format!("Opened {url}"));
                StatusPayload::bare(Status::Success).with("pr", url)
            }
            PublishOutcome::Partial { error } => {
                self.store("pull_request.json", &serde_json::json!({"error": error}));
                self.reporter.warning(partial_message);
                StatusPayload::new(Status::Partial, partial_message).with("error", error)
            }
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::test_support::{context, local};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_token_precedence() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        assert_eq!(ctx.github_token(&local("b")), None);

        ctx.config.vcs.github_token = "from-config".to_string();
        assert_eq!(ctx.github_token(&local("b")).as_deref(), Some("from-config"));

        let flag = PublishArgs {
            branch: "b".to_string(),
            github_token: Some("from-flag".to_string()),
        };
        assert_eq!(ctx.github_token(&flag).as_deref(), Some("from-flag"));
    }

    #[test]
    fn test_publish_without_token_is_local_success() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let payload = ctx.publish(dir.path(), &local("b"), "t", "body", "Updated locally (no PR)", "unused");
        assert_eq!(payload.status, Status::Success);
        assert_eq!(payload.message.as_deref(), Some("Updated locally (no PR)"));
    }

    #[test]
    fn test_load_sets_reporter_verbosity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autoheal.yaml");
        std::fs::write(
            &path,
            format!("artifact_store:\n  path: {}\n", dir.path().join("artifacts").display()),
        )
        .unwrap();
        let cli = CliConfig::new().with_config_path(&path);

        let ctx = Context::load(&cli.clone().with_verbosity(crate::Verbosity::Verbose)).unwrap();
        assert!(ctx.reporter.shows_details());
        let ctx = Context::load(&cli.with_verbosity(crate::Verbosity::Normal)).unwrap();
        assert!(!ctx.reporter.shows_details());
    }
}
