//! Propose → apply → verify → commit-or-rollback state machine.
//!
//! ```text
//! Init → Detecting ──pass──────────────────────────────▶ AlreadyPassed
//!           │ fail
//!           ▼
//!     CaptureSnapshot → Proposing ──none───────────────▶ NoCandidateFound
//!                           │ candidate
//!                           ▼
//!                       Applying → Verifying ──pass──▶ Committed ─┐
//!                           │          │ fail                      ├─▶ Done
//!                           └──────────┴────────────▶ RolledBack ─┘
//! ```
//!
//! A cycle that does not commit always leaves the target artifact with the
//! exact bytes it had before the cycle started.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::executor::TestExecutor;
use crate::ledger::{LedgerEntry, LedgerSink};
use crate::model::{FailureReport, LocatorCandidate, Platform, ValidationResult};
use crate::patch::PatchApplier;
use crate::result::{HealError, HealResult};
use crate::strategy::{IosHeuristic, ProposalStrategy, WebHeuristic};
use crate::validator::{PatchValidator, StructuralValidator};

/// Orchestrator states, recorded in order in [`HealOutcome::trace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealState {
    /// Cycle started
    Init,
    /// Initial test run
    Detecting,
    /// Failure artifacts persisted
    CaptureSnapshot,
    /// Strategy consulted
    Proposing,
    /// Patch written
    Applying,
    /// Test re-run against the patch
    Verifying,
    /// Patch kept
    Committed,
    /// Original restored
    RolledBack,
    /// Cycle finished after commit or rollback
    Done,
    /// Terminal: no candidate
    NoCandidateFound,
    /// Terminal: test was not failing
    AlreadyPassed,
}

/// Terminal status of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealStatus {
    /// Initial run passed; nothing attempted
    AlreadyPassed,
    /// Strategy had nothing to propose
    NoCandidateFound,
    /// Patch applied and test passes
    Healed,
    /// Patch rejected or test still failing; target restored
    FailedValidation,
}

impl HealStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyPassed => "already_passed",
            Self::NoCandidateFound => "no_candidate_found",
            Self::Healed => "healed",
            Self::FailedValidation => "failed_validation",
        }
    }
}

/// Input to one healing cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealRequest {
    /// Test identifier handed to the executor
    pub test_id: String,
    /// UI snapshot captured at failure time
    pub snapshot: PathBuf,
    /// Locator that no longer matches
    pub old_locator: String,
    /// Platform tag
    pub platform: Platform,
    /// Target artifact, overriding the platform default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
}

impl HealRequest {
    /// Create a request using the platform's default target
    #[must_use]
    pub fn new(
        test_id: impl Into<String>,
        snapshot: impl Into<PathBuf>,
        old_locator: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            snapshot: snapshot.into(),
            old_locator: old_locator.into(),
            platform,
            target: None,
        }
    }

    /// Patch `target` instead of the platform default
    #[must_use]
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Result of one healing cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealOutcome {
    /// Terminal status
    pub status: HealStatus,
    /// Platform tag
    pub platform: Platform,
    /// Test identifier
    pub test_id: String,
    /// Failure captured by the initial run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    /// Proposed candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<LocatorCandidate>,
    /// Target artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    /// Unified diff of the applied patch
    #[serde(default)]
    pub diff: String,
    /// Whether the target was restored
    #[serde(default)]
    pub rolled_back: bool,
    /// Validation verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    /// Why the cycle did not heal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// States visited
    pub trace: Vec<HealState>,
}

impl HealOutcome {
    fn new(request: &HealRequest) -> Self {
        Self {
            status: HealStatus::FailedValidation,
            platform: request.platform,
            test_id: request.test_id.clone(),
            failure: None,
            candidate: None,
            target: None,
            diff: String::new(),
            rolled_back: false,
            validation: None,
            reason: None,
            trace: vec![HealState::Init],
        }
    }

    fn enter(&mut self, state: HealState) {
        info!(state = ?state, test = %self.test_id, "Heal transition");
        self.trace.push(state);
    }

    /// Whether the patch was kept
    #[must_use]
    pub fn is_healed(&self) -> bool {
        self.status == HealStatus::Healed
    }
}

/// Drives healing cycles for one tests directory.
///
/// Strategies are registered per platform. Web and iOS heuristics are
/// registered by default; a platform without a strategy is rejected before
/// any test runs.
pub struct Orchestrator {
    tests_dir: PathBuf,
    targets: HashMap<Platform, PathBuf>,
    strategies: HashMap<Platform, Box<dyn ProposalStrategy>>,
    executor: Box<dyn TestExecutor>,
    artifacts: Box<dyn ArtifactStore>,
    ledger: Box<dyn LedgerSink>,
    validator: Box<dyn PatchValidator>,
    applier: PatchApplier,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut platforms: Vec<_> = self.strategies.keys().collect();
        platforms.sort();
        f.debug_struct("Orchestrator")
            .field("tests_dir", &self.tests_dir)
            .field("targets", &self.targets)
            .field("strategies", &platforms)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with default strategies and targets
    #[must_use]
    pub fn new(
        tests_dir: impl Into<PathBuf>,
        executor: Box<dyn TestExecutor>,
        artifacts: Box<dyn ArtifactStore>,
        ledger: Box<dyn LedgerSink>,
    ) -> Self {
        Self::from_config(&Config::default(), tests_dir, executor, artifacts, ledger)
    }

    /// Create an orchestrator using the `heal` section of `config`
    #[must_use]
    pub fn from_config(
        config: &Config,
        tests_dir: impl Into<PathBuf>,
        executor: Box<dyn TestExecutor>,
        artifacts: Box<dyn ArtifactStore>,
        ledger: Box<dyn LedgerSink>,
    ) -> Self {
        let heal = &config.heal;
        let mut targets = HashMap::new();
        targets.insert(Platform::Web, heal.web_target.clone());
        targets.insert(Platform::Ios, heal.ios_target.clone());
        targets.insert(Platform::Android, heal.android_target.clone());

        let mut strategies: HashMap<Platform, Box<dyn ProposalStrategy>> = HashMap::new();
        strategies.insert(Platform::Web, Box::new(WebHeuristic::new()));
        strategies.insert(
            Platform::Ios,
            Box::new(IosHeuristic::new(heal.prefer_accessibility)),
        );

        Self {
            tests_dir: tests_dir.into(),
            targets,
            strategies,
            executor,
            artifacts,
            ledger,
            validator: Box::new(StructuralValidator::new()),
            applier: PatchApplier::new(),
        }
    }

    /// Register (or replace) the strategy for a platform
    #[must_use]
    pub fn with_strategy(mut self, platform: Platform, strategy: Box<dyn ProposalStrategy>) -> Self {
        self.strategies.insert(platform, strategy);
        self
    }

    /// Replace the patch validator
    #[must_use]
    pub fn with_validator(mut self, validator: Box<dyn PatchValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Set the default target for a platform, relative to the tests dir
    #[must_use]
    pub fn with_target(mut self, platform: Platform, target: impl Into<PathBuf>) -> Self {
        self.targets.insert(platform, target.into());
        self
    }

    /// Whether a strategy is registered for `platform`
    #[must_use]
    pub fn supports(&self, platform: Platform) -> bool {
        self.strategies.contains_key(&platform)
    }

    /// Target artifact for a request
    #[must_use]
    pub fn target_for(&self, request: &HealRequest) -> PathBuf {
        let rel = request
            .target
            .clone()
            .or_else(|| self.targets.get(&request.platform).cloned())
            .unwrap_or_default();
        if rel.is_absolute() {
            rel
        } else {
            self.tests_dir.join(rel)
        }
    }

    /// Run one healing cycle.
    ///
    /// Only an unsupported platform or a failed restore is an error; every
    /// other failure ends in a terminal status.
    pub fn run_once(&self, request: &HealRequest) -> HealResult<HealOutcome> {
        let strategy = self
            .strategies
            .get(&request.platform)
            .ok_or_else(|| HealError::unsupported_platform(request.platform.as_str()))?;
        let mut outcome = HealOutcome::new(request);

        outcome.enter(HealState::Detecting);
        let first = self.executor.run(&request.test_id);
        if first.passed {
            outcome.status = HealStatus::AlreadyPassed;
            outcome.enter(HealState::AlreadyPassed);
            self.record(&mut outcome, ValidationResult::pass().with_detail("tests_passed", true));
            return Ok(outcome);
        }

        outcome.enter(HealState::CaptureSnapshot);
        let error = first.error.unwrap_or_else(|| "unknown error".to_string());
        self.best_effort("failure_error", self.artifacts.put_text("failure_error", &error));
        let snapshot = match std::fs::read_to_string(&request.snapshot) {
            Ok(text) => text,
            Err(e) => {
                warn!(snapshot = %request.snapshot.display(), error = %e, "Snapshot unreadable, proposing from empty snapshot");
                String::new()
            }
        };
        self.best_effort("snapshot", self.artifacts.put_text("snapshot", &snapshot));
        outcome.failure = Some(FailureReport {
            test_id: request.test_id.clone(),
            error: Some(error),
            snapshot: request.snapshot.clone(),
            workspace: self.tests_dir.clone(),
            platform: request.platform,
        });

        outcome.enter(HealState::Proposing);
        let Some(candidate) = strategy.propose(&request.old_locator, &snapshot) else {
            outcome.status = HealStatus::NoCandidateFound;
            outcome.reason = Some(format!(
                "{} found no replacement for '{}'",
                strategy.name(),
                request.old_locator
            ));
            outcome.enter(HealState::NoCandidateFound);
            self.record(&mut outcome, ValidationResult::reject("no candidate found"));
            return Ok(outcome);
        };
        let target = self.target_for(request);
        let suggestion = serde_json::json!({
            "platform": request.platform,
            "old_locator": request.old_locator,
            "strategy": candidate.strategy,
            "value": candidate.value,
            "rationale": candidate.rationale,
            "target": target,
        });
        self.best_effort("suggested_patch", self.artifacts.put_json("suggested_patch", &suggestion));
        outcome.candidate = Some(candidate.clone());
        outcome.target = Some(target.clone());

        let precheck = self.validator.validate(&self.tests_dir, &suggestion);
        if !precheck.ok {
            let reason = precheck.reason().unwrap_or("patch rejected").to_string();
            return self.roll_back(outcome, &target, None, reason, precheck);
        }

        outcome.enter(HealState::Applying);
        let before = std::fs::read_to_string(&target).ok();
        let patch = match self.applier.apply(&target, &candidate.value) {
            Ok(patch) => patch,
            Err(e) => {
                let mut v = ValidationResult::reject(format!("apply failed: {e}"));
                v.policy_ok = precheck.policy_ok;
                return self.roll_back(outcome, &target, before.as_deref(), format!("apply failed: {e}"), v);
            }
        };
        outcome.diff.clone_from(&patch.diff);

        outcome.enter(HealState::Verifying);
        let rerun = self.executor.run(&request.test_id);
        let changed_lines = patch.changed_lines();
        let patch = patch.verified(rerun.passed);

        let validation = ValidationResult {
            ok: patch.ok,
            tests_passed: rerun.passed,
            policy_ok: precheck.policy_ok,
            changed_lines,
            details: precheck.details,
        };

        if patch.ok {
            outcome.enter(HealState::Committed);
            self.best_effort("patch.diff", self.artifacts.put_text("patch.diff", &patch.diff));
            outcome.status = HealStatus::Healed;
            outcome.enter(HealState::Done);
            self.record(&mut outcome, validation);
            return Ok(outcome);
        }

        let reason = rerun
            .error
            .unwrap_or_else(|| "test still failing after patch".to_string());
        let validation = validation.with_detail("reason", reason.clone());
        self.roll_back(outcome, &target, Some(&patch.original_text), reason, validation)
    }

    fn roll_back(
        &self,
        mut outcome: HealOutcome,
        target: &Path,
        original: Option<&str>,
        reason: String,
        validation: ValidationResult,
    ) -> HealResult<HealOutcome> {
        outcome.enter(HealState::RolledBack);
        if let Some(original) = original {
            let current = std::fs::read(target).ok();
            if current.as_deref() != Some(original.as_bytes()) {
                self.applier.revert(target, original)?;
            }
        }
        warn!(target = %target.display(), reason = %reason, "Patch rolled back");
        outcome.status = HealStatus::FailedValidation;
        outcome.rolled_back = true;
        outcome.reason = Some(reason);
        outcome.enter(HealState::Done);
        self.record(&mut outcome, validation);
        Ok(outcome)
    }

    fn record(&self, outcome: &mut HealOutcome, validation: ValidationResult) {
        outcome.validation = Some(validation.clone());
        match serde_json::to_value(&*outcome) {
            Ok(body) => self.best_effort("validation_result", self.artifacts.put_json("validation_result", &body)),
            Err(e) => warn!(error = %e, "Cannot serialize heal outcome"),
        }

        let summary = outcome
            .candidate
            .as_ref()
            .map(|c| c.rationale.clone())
            .unwrap_or_default();
        let entry = LedgerEntry::new("heal", &self.tests_dir, outcome.status.as_str())
            .with_patch_summary(summary)
            .with_validation(validation);
        if let Err(e) = self.ledger.append(&entry) {
            warn!(error = %e, "Ledger append failed");
        }
        info!(status = outcome.status.as_str(), platform = %outcome.platform, "Heal cycle finished");
    }

    fn best_effort<T>(&self, name: &str, result: HealResult<T>) {
        if let Err(e) = result {
            warn!(artifact = name, error = %e, "Artifact capture failed");
        }
    }
}
