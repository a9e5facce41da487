//! Locator proposal strategies.
//!
//! A strategy looks at the old locator and a snapshot of the current UI and
//! proposes at most one replacement. `None` means "nothing to propose" and
//! ends the healing cycle early.
//!
//! | Strategy        | Snapshot               | Candidate tag                              |
//! |-----------------|------------------------|--------------------------------------------|
//! | [`WebHeuristic`]| HTML                   | `web_heuristic`                            |
//! | [`IosHeuristic`]| accessibility-tree XML | `ios_accessibility_id` / `ios_predicate`   |
//! | [`LlmMapping`]  | identifier batch       | `llm_mapping`                              |

mod ios;
mod llm;
mod web;

pub use ios::IosHeuristic;
pub use llm::{LlmMapping, MappingContext};
pub use web::WebHeuristic;

use crate::model::LocatorCandidate;

/// A single-candidate locator proposal strategy
pub trait ProposalStrategy {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Propose a replacement for `old_locator` given the UI `snapshot`
    fn propose(&self, old_locator: &str, snapshot: &str) -> Option<LocatorCandidate>;
}
