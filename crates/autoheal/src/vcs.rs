//! Branch, commit, push and pull-request plumbing for the tests repository.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::VcsConfig;

/// GitHub REST root
pub const GITHUB_API: &str = "https://api.github.com";

/// Source-control failures
#[derive(Debug, Error)]
pub enum VcsError {
    /// A git command could not run or exited non-zero
    #[error("git {command} failed: {message}")]
    Git {
        /// Subcommand
        command: String,
        /// stderr or spawn error
        message: String,
    },

    /// The pull-request API call failed
    #[error("pull request request failed: {0}")]
    Http(String),

    /// The API answered without a usable pull request
    #[error("unexpected pull request response: {0}")]
    Response(String),

    /// No repository configured for pull requests
    #[error("no repository configured for pull requests")]
    NoRepository,
}

/// Git driven through the `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    /// Git in the working tree at `repo`
    #[must_use]
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// Working tree
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let command = args.first().copied().unwrap_or_default().to_string();
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .map_err(|e| VcsError::Git {
                command: command.clone(),
                message: e.to_string(),
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(VcsError::Git {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// `git checkout -b <branch>`
    pub fn create_branch(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&["checkout", "-b", branch]).map(drop)
    }

    /// `git add -A`
    pub fn stage_all(&self) -> Result<(), VcsError> {
        self.git(&["add", "-A"]).map(drop)
    }

    /// `git commit -m <message>`
    pub fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.git(&["commit", "-m", message]).map(drop)
    }

    /// `git push -u origin <branch>`
    pub fn push(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&["push", "-u", "origin", branch]).map(drop)
    }

    /// Branch, stage, commit and push.
    ///
    /// Branch creation and commit failures are tolerated (existing branch,
    /// nothing to commit); staging and pushing are not.
    pub fn publish_branch(&self, branch: &str, message: &str) -> Result<(), VcsError> {
        if let Err(e) = self.create_branch(branch) {
            warn!(branch, error = %e, "Branch not created, continuing on current branch");
        }
        self.stage_all()?;
        if let Err(e) = self.commit(message) {
            warn!(error = %e, "Commit skipped");
        }
        self.push(branch)?;
        info!(branch, repo = %self.repo.display(), "Pushed branch");
        Ok(())
    }
}

/// Pull-request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Title
    pub title: String,
    /// Source branch
    pub head: String,
    /// Target branch
    pub base: String,
    /// Description
    pub body: String,
}

/// Opened pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// Browser URL
    pub html_url: String,
    /// Full API response
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Minimal GitHub pull-request client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    token: String,
    repo: String,
    api_base: String,
}

impl GitHubClient {
    /// Client for `owner/name` authenticated with `token`
    #[must_use]
    pub fn new(token: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            repo: repo.into(),
            api_base: GITHUB_API.to_string(),
        }
    }

    /// Point at a GitHub Enterprise API root
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// `POST /repos/<repo>/pulls` URL
    #[must_use]
    pub fn pulls_url(&self) -> String {
        format!("{}/repos/{}/pulls", self.api_base.trim_end_matches('/'), self.repo)
    }

    /// Open a pull request
    pub fn open_pr(&self, pr: &PullRequest) -> Result<PullRequestInfo, VcsError> {
        if self.repo.is_empty() {
            return Err(VcsError::NoRepository);
        }
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build()
            .into();
        let response = agent
            .post(&self.pulls_url())
            .header("Authorization", &format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send_json(pr)
            .map_err(|e| VcsError::Http(e.to_string()))?;
        let raw: serde_json::Value = response
            .into_body()
            .read_json()
            .map_err(|e| VcsError::Response(e.to_string()))?;
        pull_request_info(raw)
    }
}

fn pull_request_info(raw: serde_json::Value) -> Result<PullRequestInfo, VcsError> {
    let html_url = raw
        .get("html_url")
        .and_then(|u| u.as_str())
        .ok_or_else(|| VcsError::Response("missing html_url".to_string()))?
        .to_string();
    Ok(PullRequestInfo { html_url, raw })
}

/// Result of a publish attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Branch pushed and pull request opened
    Opened {
        /// Pull-request URL
        url: String,
        /// API response
        pr: serde_json::Value,
    },
    /// Changes are local; some step failed
    Partial {
        /// What failed
        error: String,
    },
}

/// Pushes a branch and opens one pull request for it
#[derive(Debug, Clone)]
pub struct PullRequestPublisher {
    git: GitCli,
    github: GitHubClient,
    base: String,
}

impl PullRequestPublisher {
    /// Publisher for the working tree at `repo`
    #[must_use]
    pub fn new(git: GitCli, github: GitHubClient, base: impl Into<String>) -> Self {
        Self {
            git,
            github,
            base: base.into(),
        }
    }

    /// Publisher configured from the `vcs` section
    #[must_use]
    pub fn from_config(repo: &Path, config: &VcsConfig, token: &str) -> Self {
        Self::new(
            GitCli::new(repo),
            GitHubClient::new(token, config.repo.clone()),
            config.base_branch.clone(),
        )
    }

    /// Push `branch` with `title` as commit message and open a pull request.
    /// Never fails: every error becomes [`PublishOutcome::Partial`].
    pub fn publish(&self, branch: &str, title: &str, body: &str) -> PublishOutcome {
        if let Err(e) = self.git.publish_branch(branch, title) {
            warn!(error = %e, "Publishing branch failed");
            return PublishOutcome::Partial { error: e.to_string() };
        }
        let pr = PullRequest {
            title: title.to_string(),
            head: branch.to_string(),
            base: self.base.clone(),
            body: body.to_string(),
        };
        match self.github.open_pr(&pr) {
            Ok(info) => {
                info!(url = %info.html_url, "Opened pull request");
                PublishOutcome::Opened {
                    url: info.html_url,
                    pr: info.raw,
                }
            }
            Err(e) => {
                warn!(error = %e, "Opening pull request failed");
                PublishOutcome::Partial { error: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let git = GitCli::new(dir.path());
        git.git(&["init", "-q"]).unwrap();
        git.git(&["config", "user.email", "heal@example.com"]).unwrap();
        git.git(&["config", "user.name", "Heal Bot"]).unwrap();
        std::fs::write(dir.path().join("README.md"), "tests\n").unwrap();
        git.stage_all().unwrap();
        git.commit("init").unwrap();
        dir
    }

    mod github_tests {
        use super::*;

        #[test]
        fn test_pulls_url() {
            let gh = GitHubClient::new("t", "acme/e2e-tests");
            assert_eq!(gh.pulls_url(), "https://api.github.com/repos/acme/e2e-tests/pulls");
            let ghe = gh.with_api_base("https://ghe.example.com/api/v3/");
            assert_eq!(ghe.pulls_url(), "https://ghe.example.com/api/v3/repos/acme/e2e-tests/pulls");
        }

        #[test]
        fn test_payload_shape() {
            let pr = PullRequest {
                title: "Auto-heal: rename 'Check Out' -> 'Checkout'".to_string(),
                head: "autoheal/rename".to_string(),
                base: "main".to_string(),
                body: "Automated patch".to_string(),
            };
            let v = serde_json::to_value(&pr).unwrap();
            assert_eq!(v["head"], "autoheal/rename");
            assert_eq!(v["base"], "main");
        }

        #[test]
        fn test_response_needs_html_url() {
            let ok = pull_request_info(json!({"html_url": "https://github.com/acme/e2e/pull/7", "number": 7})).unwrap();
            assert_eq!(ok.html_url, "https://github.com/acme/e2e/pull/7");
            assert_eq!(ok.raw["number"], 7);
            assert!(matches!(
                pull_request_info(json!({"message": "Validation Failed"})),
                Err(VcsError::Response(_))
            ));
        }

        #[test]
        fn test_missing_repository() {
            let gh = GitHubClient::new("t", "");
            let pr = PullRequest {
                title: String::new(),
                head: String::new(),
                base: String::new(),
                body: String::new(),
            };
            assert!(matches!(gh.open_pr(&pr), Err(VcsError::NoRepository)));
        }
    }

    mod git_tests {
        use super::*;

        #[test]
        fn test_publish_without_remote_is_partial() {
            if !git_available() {
                return;
            }
            let dir = init_repo();
            std::fs::write(dir.path().join("mapping.yaml"), "android: []\n").unwrap();
            let publisher = PullRequestPublisher::new(
                GitCli::new(dir.path()),
                GitHubClient::new("t", "acme/e2e-tests"),
                "main",
            );
            let outcome = publisher.publish("autoheal/update", "Auto-heal: update identifiers", "body");
            let PublishOutcome::Partial { error } = outcome else {
                panic!("expected partial outcome");
            };
            assert!(error.contains("push"));

            // Branch and commit happened locally.
            let git = GitCli::new(dir.path());
            let head = git.git(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap();
            assert_eq!(head.trim(), "autoheal/update");
            let log = git.git(&["log", "-1", "--pretty=%s"]).unwrap();
            assert_eq!(log.trim(), "Auto-heal: update identifiers");
        }

        #[test]
        fn test_git_outside_repository_fails() {
            if !git_available() {
                return;
            }
            let dir = TempDir::new().unwrap();
            let err = GitCli::new(dir.path().join("missing")).stage_all().unwrap_err();
            assert!(matches!(err, VcsError::Git { .. }));
        }
    }

    #[test]
    fn test_outcome_serialization() {
        let v = serde_json::to_value(PublishOutcome::Partial { error: "boom".to_string() }).unwrap();
        assert_eq!(v, json!({"status": "partial", "error": "boom"}));
    }
}
