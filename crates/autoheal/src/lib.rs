//! Autoheal: self-healing locators for UI tests
//!
//! A failing UI test usually fails because an element moved or was renamed,
//! not because the feature broke. Autoheal re-runs the test, proposes a
//! replacement locator from a snapshot of the current UI, patches the test
//! source, re-runs it, and either keeps the patch or restores the original
//! bytes. Every cycle leaves artifacts and an append-only ledger entry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        AUTOHEAL cycle                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌──────────────┐   │
//! │  │ Executor │──►│ Strategy  │──►│ Patch   │──►│ Executor     │   │
//! │  │ (fail?)  │   │ web / ios │   │ applier │   │ (re-run)     │   │
//! │  └──────────┘   └───────────┘   └─────────┘   └──────┬───────┘   │
//! │                                                pass  │  fail     │
//! │                                   keep patch ◄───────┴──► revert │
//! │                                                                  │
//! │  Artifacts (named JSON/text)          Ledger (JSONL, append-only)│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Alongside the cycle: identifier discovery in app sources, tiered
//! resolution to logical names, provider-backed mapping suggestions, bulk
//! YAML mapping updates, text renames and pull-request publishing.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod model;
mod result;

pub mod artifact;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod ledger;
pub mod mapping;
pub mod orchestrator;
pub mod patch;
pub mod pipeline;
pub mod provider;
pub mod rename;
pub mod resolve;
pub mod retriever;
pub mod strategy;
pub mod sync;
pub mod validator;
pub mod vcs;

pub use artifact::{Artifact, ArtifactKind, ArtifactStore, FsArtifactStore};
pub use config::Config;
pub use discovery::{discover, AppPlatform, PlatformLocators};
pub use executor::{CommandExecutor, FnExecutor, TestExecutor, TestOutcome};
pub use ledger::{JsonlLedger, LedgerEntry, LedgerSink};
pub use mapping::{BulkUpdateReport, MappingUpdater, UpdateReport};
pub use model::{
    changed_lines, FailureReport, IosLocatorStrategy, LocatorCandidate, LocatorValue,
    MappingUpdate, PatchResult, Platform, StrategyTag, ValidationResult,
};
pub use orchestrator::{HealOutcome, HealRequest, HealState, HealStatus, Orchestrator};
pub use patch::PatchApplier;
pub use pipeline::{CiEvent, Pipeline, PipelineOutcome, PipelineStatus};
pub use provider::{provider_from_config, LlmProvider, PatchRequest, PatchResponse};
pub use rename::{find_and_replace_text, RenameReport};
pub use resolve::{IdentifierResolver, Resolution, ResolutionTier};
pub use result::{HealError, HealResult};
pub use retriever::{EmptyRetriever, GitHistoryRetriever, LocalRetriever, RetrievalQuery, Retriever};
pub use strategy::{IosHeuristic, LlmMapping, MappingContext, ProposalStrategy, WebHeuristic};
pub use sync::{plan_updates, UpdatePlan};
pub use validator::{PatchValidator, StructuralValidator};
pub use vcs::{GitCli, GitHubClient, PublishOutcome, PullRequestPublisher};

/// Common imports
pub mod prelude {
    pub use super::artifact::*;
    pub use super::executor::*;
    pub use super::ledger::*;
    pub use super::model::*;
    pub use super::orchestrator::*;
    pub use super::result::*;
    pub use super::strategy::*;
    pub use super::validator::*;
}
