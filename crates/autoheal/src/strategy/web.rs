//! HTML id heuristic for web tests.

use regex::Regex;

use super::ProposalStrategy;
use crate::model::{LocatorCandidate, LocatorValue, StrategyTag};

/// Prefix marking button ids
pub const BUTTON_PREFIX: &str = "btn";

/// Name fragments preferred when picking among button ids, in priority order
pub const PREFERRED_FRAGMENTS: [&str; 4] = ["proceed", "continue", "submit", "checkout"];

/// Picks a replacement element id from an HTML snapshot.
///
/// Button ids (`btn*`) win over other elements, and among buttons the
/// first id carrying a preferred fragment wins.
#[derive(Debug, Clone)]
pub struct WebHeuristic {
    id_attr: Regex,
}

impl Default for WebHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl WebHeuristic {
    /// Create the heuristic
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            id_attr: Regex::new(r#"id="([^"]+)""#).expect("static pattern"),
        }
    }

    /// Every `id="..."` value in document order
    #[must_use]
    pub fn candidate_ids<'a>(&self, html: &'a str) -> Vec<&'a str> {
        self.id_attr
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Choose the replacement id, or `None` when the snapshot has no ids
    #[must_use]
    pub fn guess_replacement<'a>(&self, html: &'a str) -> Option<&'a str> {
        let ids = self.candidate_ids(html);
        let buttons: Vec<&str> = ids
            .iter()
            .copied()
            .filter(|id| id.to_lowercase().starts_with(BUTTON_PREFIX))
            .collect();

        if buttons.is_empty() {
            return ids.first().copied();
        }

        for fragment in PREFERRED_FRAGMENTS {
            if let Some(id) = buttons
                .iter()
                .copied()
                .find(|id| id.to_lowercase().contains(fragment))
            {
                return Some(id);
            }
        }
        buttons.first().copied()
    }
}

impl ProposalStrategy for WebHeuristic {
    fn name(&self) -> &'static str {
        "web_heuristic"
    }

    fn propose(&self, old_locator: &str, snapshot: &str) -> Option<LocatorCandidate> {
        let new_id = self.guess_replacement(snapshot)?;
        Some(LocatorCandidate::new(
            StrategyTag::WebHeuristic,
            LocatorValue::Id(new_id.to_string()),
            format!("Replaced '{old_locator}' with '{new_id}' via HTML heuristic."),
        ))
    }
}
