//! Demo pipeline for a CI failure event.
//!
//! ```text
//! event.json ──► FailureContext ──► retrieval (best effort) ──► prompt
//!                                                                 │
//!             ledger: merged | failed ◄── validate ◄── provider ◄─┘
//! ```
//!
//! Retrieval problems never stop the run; a rejected patch ends it with a
//! `failed` ledger entry and [`PipelineStatus::Failed`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::ArtifactStore;
use crate::config::{Config, LlmConfig};
use crate::ledger::{LedgerEntry, LedgerSink};
use crate::model::ValidationResult;
use crate::provider::{LlmProvider, PatchRequest, PatchResponse};
use crate::result::{HealError, HealResult};
use crate::retriever::{IndexManifest, RetrievalQuery, Retriever, ScoredRecord};
use crate::validator::PatchValidator;

/// Records retrieved per run
pub const RETRIEVAL_K: usize = 5;

/// Snapshot characters quoted in the prompt
const SNAPSHOT_EXCERPT: usize = 500;

/// CI failure event as written by the test runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiEvent {
    /// Failing test
    #[serde(default = "default_test_name")]
    pub test_name: String,
    /// Test log file
    #[serde(default)]
    pub log_path: String,
    /// UI snapshot captured at failure
    #[serde(default)]
    pub dom_snapshot: String,
    /// Locator that no longer matches
    #[serde(default = "default_broken_locator")]
    pub broken_locator: String,
    /// Workspace override
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

fn default_test_name() -> String {
    "unknown_test".to_string()
}

fn default_broken_locator() -> String {
    "btnCheckout".to_string()
}

impl CiEvent {
    /// Read an event file
    pub fn load(path: &Path) -> HealResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HealError::invalid_input(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Everything known about the failure before asking a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Failing test
    pub test_name: String,
    /// Log text, empty when the log is missing
    pub logs: String,
    /// Snapshot path
    pub dom_snapshot_path: String,
    /// Locator that no longer matches
    pub broken_locator: String,
    /// Workspace the patch applies to
    pub workspace: PathBuf,
}

impl FailureContext {
    /// Build from an event; the event's workspace wins over `workspace`
    #[must_use]
    pub fn from_event(event: &CiEvent, workspace: &Path) -> Self {
        let logs = if event.log_path.is_empty() {
            String::new()
        } else {
            std::fs::read_to_string(&event.log_path).unwrap_or_default()
        };
        Self {
            test_name: event.test_name.clone(),
            logs,
            dom_snapshot_path: event.dom_snapshot.clone(),
            broken_locator: event.broken_locator.clone(),
            workspace: event
                .workspace
                .clone()
                .unwrap_or_else(|| workspace.to_path_buf()),
        }
    }

    /// Last non-empty log line
    #[must_use]
    pub fn error_trace(&self) -> &str {
        self.logs
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("unknown error")
    }

    /// Leading characters of the snapshot, empty when unreadable
    #[must_use]
    pub fn snapshot_excerpt(&self) -> String {
        if self.dom_snapshot_path.is_empty() {
            return String::new();
        }
        std::fs::read_to_string(&self.dom_snapshot_path)
            .map(|s| s.chars().take(SNAPSHOT_EXCERPT).collect())
            .unwrap_or_default()
    }
}

/// One-line instruction for a locator fix
#[must_use]
pub fn build_locator_fix_prompt(test_name: &str, error_trace: &str, old_key: &str, snapshot_excerpt: &str) -> String {
    format!(
        "Fix locator for {test_name} failing with {error_trace}. Old key: {old_key}. Snippet: {snapshot_excerpt}"
    )
}

/// Prompt payload handed to the provider and stored as `prompt.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Instruction text
    pub prompt: String,
    /// Failure the prompt describes
    pub failure: FailureContext,
    /// Grounding records
    pub retrieved: Vec<ScoredRecord>,
}

impl Prompt {
    /// Assemble from a failure and retrieved context
    #[must_use]
    pub fn build(failure: FailureContext, retrieved: Vec<ScoredRecord>) -> Self {
        let prompt = build_locator_fix_prompt(
            &failure.test_name,
            failure.error_trace(),
            &failure.broken_locator,
            &failure.snapshot_excerpt(),
        );
        Self {
            prompt,
            failure,
            retrieved,
        }
    }
}

/// Provider details recorded per run; never includes keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmInfo {
    /// Configured provider
    pub provider: String,
    /// Configured model
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Record time
    pub ts: DateTime<Utc>,
}

/// Store `llm_info.json`; failures are logged and ignored
pub fn record_llm_info(artifacts: &dyn ArtifactStore, config: &LlmConfig) {
    info!(provider = %config.provider, model = %config.model, "Using language model");
    let payload = LlmInfo {
        provider: config.provider.clone(),
        model: config.model.clone(),
        temperature: config.temperature,
        ts: Utc::now(),
    };
    let stored = serde_json::to_value(&payload)
        .map_err(HealError::from)
        .and_then(|v| artifacts.put_json("llm_info.json", &v));
    if let Err(e) = stored {
        warn!(error = %e, "Writing llm_info failed");
    }
}

/// Store an index manifest under `name`; failures are logged and ignored
pub fn record_index_manifest(artifacts: &dyn ArtifactStore, base_path: &Path, name: &str) {
    let manifest = IndexManifest::scan(base_path);
    let stored = serde_json::to_value(&manifest)
        .map_err(HealError::from)
        .and_then(|v| artifacts.put_json(name, &v));
    if let Err(e) = stored {
        warn!(error = %e, "Index manifest generation failed");
    }
}

/// Terminal status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Patch validated and recorded as merged
    Merged,
    /// Patch rejected
    Failed,
}

impl PipelineStatus {
    /// Ledger outcome tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Failed => "failed",
        }
    }
}

/// Pipeline result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Terminal status
    pub status: PipelineStatus,
    /// Provider answer
    pub patch: PatchResponse,
    /// Validation verdict
    pub validation: ValidationResult,
    /// Workspace the patch was validated against
    pub workspace: PathBuf,
}

/// Wires provider, retriever, validator, artifacts and ledger for one run
pub struct Pipeline {
    llm: LlmConfig,
    index_path: PathBuf,
    provider: Box<dyn LlmProvider>,
    retriever: Box<dyn Retriever>,
    validator: Box<dyn PatchValidator>,
    artifacts: Box<dyn ArtifactStore>,
    ledger: Box<dyn LedgerSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("provider", &self.provider.name())
            .field("index_path", &self.index_path)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Assemble a pipeline
    #[must_use]
    pub fn new(
        config: &Config,
        provider: Box<dyn LlmProvider>,
        retriever: Box<dyn Retriever>,
        validator: Box<dyn PatchValidator>,
        artifacts: Box<dyn ArtifactStore>,
        ledger: Box<dyn LedgerSink>,
    ) -> Self {
        Self {
            llm: config.llm.clone(),
            index_path: config.vectordb.base_path.clone(),
            provider,
            retriever,
            validator,
            artifacts,
            ledger,
        }
    }

    fn store(&self, name: &str, value: &impl Serialize) {
        let stored = serde_json::to_value(value)
            .map_err(HealError::from)
            .and_then(|v| self.artifacts.put_json(name, &v));
        if let Err(e) = stored {
            warn!(artifact = name, error = %e, "Artifact write failed");
        }
    }

    /// Run once for `event`.
    ///
    /// Provider errors and ledger failures are hard errors; a rejected patch
    /// is a normal [`PipelineStatus::Failed`] outcome.
    pub fn run(&self, event: &CiEvent, workspace: &Path) -> HealResult<PipelineOutcome> {
        let failure = FailureContext::from_event(event, workspace);
        info!(test = %failure.test_name, locator = %failure.broken_locator, "Pipeline started");

        let query = RetrievalQuery::new().with("broken", failure.broken_locator.clone());
        let retrieved = self.retriever.topk(&query, RETRIEVAL_K).unwrap_or_else(|e| {
            warn!(error = %e, "Retrieval failed, continuing without context");
            Vec::new()
        });
        record_index_manifest(self.artifacts.as_ref(), &self.index_path, "rag_index_manifest_run.json");

        let prompt = Prompt::build(failure, retrieved);
        self.store("prompt.json", &prompt);

        record_llm_info(self.artifacts.as_ref(), &self.llm);
        let request = PatchRequest::fix_locator(serde_json::to_value(&prompt)?);
        let patch = self
            .provider
            .generate_patch(&request)
            .map_err(|e| HealError::invalid_input(e.to_string()))?;
        self.store("patch.json", &patch);

        let workspace = prompt.failure.workspace.clone();
        let validation = self.validator.validate(&workspace, &serde_json::to_value(&patch)?);
        self.store("validation.json", &validation);

        let status = if validation.ok {
            PipelineStatus::Merged
        } else {
            PipelineStatus::Failed
        };
        let summary = patch
            .patch
            .clone()
            .or_else(|| patch.explanation.clone())
            .unwrap_or_default();
        self.ledger.append(
            &LedgerEntry::new("pipeline", &workspace, status.as_str())
                .with_patch_summary(summary)
                .with_validation(validation.clone()),
        )?;
        match status {
            PipelineStatus::Merged => info!(workspace = %workspace.display(), "Patch merged"),
            PipelineStatus::Failed => warn!(reason = ?validation.reason(), "Validation failed; patch not merged"),
        }
        Ok(PipelineOutcome {
            status,
            patch,
            validation,
            workspace,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::artifact::FsArtifactStore;
    use crate::ledger::JsonlLedger;
    use crate::provider::{ProviderError, RuleBasedProvider};
    use crate::retriever::{EmptyRetriever, IndexRecord, LocalRetriever};
    use crate::validator::StructuralValidator;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("ws")).unwrap();
            std::fs::write(dir.path().join("test.log"), "collected 1 item\nAssertionError: #btnCheckout not found\n\n").unwrap();
            std::fs::write(dir.path().join("snap.html"), r#"<button id="btnProceed">Proceed</button>"#).unwrap();
            let mut config = Config::default()
                .with_artifact_dir(dir.path().join("artifacts"))
                .with_ledger(dir.path().join("artifacts/patch_ledger.jsonl"));
            config.vectordb.base_path = dir.path().join(".vectordb");
            Self { dir, config }
        }

        fn event(&self) -> CiEvent {
            CiEvent {
                test_name: "test_checkout".to_string(),
                log_path: self.dir.path().join("test.log").display().to_string(),
                dom_snapshot: self.dir.path().join("snap.html").display().to_string(),
                broken_locator: "btnCheckout".to_string(),
                workspace: None,
            }
        }

        fn pipeline(&self, provider: Box<dyn LlmProvider>, retriever: Box<dyn Retriever>) -> Pipeline {
            Pipeline::new(
                &self.config,
                provider,
                retriever,
                Box::new(StructuralValidator::new()),
                Box::new(FsArtifactStore::new(&self.config.artifact_store.path).unwrap()),
                Box::new(JsonlLedger::new(&self.config.logging.patch_ledger)),
            )
        }

        fn ledger(&self) -> Vec<LedgerEntry> {
            JsonlLedger::new(&self.config.logging.patch_ledger).read_all().unwrap()
        }

        fn artifact(&self, name: &str) -> serde_json::Value {
            let store = FsArtifactStore::new(&self.config.artifact_store.path).unwrap();
            serde_json::from_str(&store.get(name).unwrap()).unwrap()
        }
    }

    struct DownProvider;

    impl LlmProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        fn generate_patch(&self, _request: &PatchRequest) -> Result<PatchResponse, ProviderError> {
            Err(ProviderError::Unavailable("connection refused".to_string()))
        }
    }

    mod context_tests {
        use super::*;

        #[test]
        fn test_prompt_text() {
            assert_eq!(
                build_locator_fix_prompt("test_checkout", "NoSuchElement", "btnCheckout", "<html/>"),
                "Fix locator for test_checkout failing with NoSuchElement. Old key: btnCheckout. Snippet: <html/>"
            );
        }

        #[test]
        fn test_failure_context_from_event() {
            let fx = Fixture::new();
            let ctx = FailureContext::from_event(&fx.event(), &fx.dir.path().join("ws"));
            assert_eq!(ctx.error_trace(), "AssertionError: #btnCheckout not found");
            assert!(ctx.snapshot_excerpt().contains("btnProceed"));
            assert_eq!(ctx.workspace, fx.dir.path().join("ws"));
        }

        #[test]
        fn test_missing_log_and_snapshot() {
            let event: CiEvent = serde_json::from_value(json!({"log_path": "/nonexistent.log"})).unwrap();
            let ctx = FailureContext::from_event(&event, Path::new("."));
            assert_eq!(ctx.test_name, "unknown_test");
            assert_eq!(ctx.broken_locator, "btnCheckout");
            assert_eq!(ctx.error_trace(), "unknown error");
            assert_eq!(ctx.snapshot_excerpt(), "");
        }

        #[test]
        fn test_event_workspace_wins() {
            let event: CiEvent = serde_json::from_value(json!({"workspace": "/srv/app"})).unwrap();
            let ctx = FailureContext::from_event(&event, Path::new("/tmp/other"));
            assert_eq!(ctx.workspace, PathBuf::from("/srv/app"));
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_valid_workspace_merges() {
            let fx = Fixture::new();
            let outcome = fx
                .pipeline(Box::new(RuleBasedProvider), Box::new(EmptyRetriever))
                .run(&fx.event(), &fx.dir.path().join("ws"))
                .unwrap();
            assert_eq!(outcome.status, PipelineStatus::Merged);
            assert!(outcome.patch.is_noop());

            let ledger = fx.ledger();
            assert_eq!(ledger.len(), 1);
            assert_eq!(ledger[0].action, "pipeline");
            assert_eq!(ledger[0].outcome, "merged");

            assert_eq!(fx.artifact("validation.json")["ok"], true);
            assert_eq!(fx.artifact("llm_info.json")["provider"], "rulebased");
            assert_eq!(fx.artifact("rag_index_manifest_run.json")["exists"], false);
            let prompt = fx.artifact("prompt.json");
            assert!(prompt["prompt"].as_str().unwrap().contains("Old key: btnCheckout"));
        }

        #[test]
        fn test_missing_workspace_fails() {
            let fx = Fixture::new();
            let outcome = fx
                .pipeline(Box::new(RuleBasedProvider), Box::new(EmptyRetriever))
                .run(&fx.event(), &fx.dir.path().join("gone"))
                .unwrap();
            assert_eq!(outcome.status, PipelineStatus::Failed);
            assert_eq!(outcome.validation.reason(), Some("workspace missing"));
            assert_eq!(fx.ledger()[0].outcome, "failed");
        }

        #[test]
        fn test_retrieved_records_reach_prompt() {
            let fx = Fixture::new();
            let index = fx.config.vectordb.base_path.clone();
            LocalRetriever::new(&index)
                .add(&[IndexRecord::new("pr-12", "btnCheckout renamed to btnProceed", json!({"pr": 12}))])
                .unwrap();
            fx.pipeline(Box::new(RuleBasedProvider), Box::new(LocalRetriever::new(&index)))
                .run(&fx.event(), &fx.dir.path().join("ws"))
                .unwrap();
            let prompt = fx.artifact("prompt.json");
            assert_eq!(prompt["retrieved"][0]["meta"]["pr"], 12);
        }

        #[test]
        fn test_provider_error_is_hard_error() {
            let fx = Fixture::new();
            let result = fx
                .pipeline(Box::new(DownProvider), Box::new(EmptyRetriever))
                .run(&fx.event(), &fx.dir.path().join("ws"));
            assert!(result.is_err());
            assert!(fx.ledger().is_empty());
        }
    }
}
