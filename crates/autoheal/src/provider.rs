//! Language-model providers.
//!
//! Every provider answers the same structured request shape. The
//! rule-based provider always answers with a no-op so a pipeline without a
//! configured model still runs end to end.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::LlmConfig;
use crate::discovery::AppPlatform;

/// What the provider is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Propose logical names and locators for unmapped identifiers
    MapIdentifiers,
    /// Propose a locator fix for a failing test
    FixLocator,
    /// Propose a text rename across the tests repository
    TextRename,
}

/// Structured request sent to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    /// Task kind
    pub task: Task,
    /// Natural-language instruction
    pub instruction: String,
    /// App platform (identifier mapping only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<AppPlatform>,
    /// Identifiers to map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    /// Grounding context (existing maps, retrieved records, prompt)
    #[serde(default)]
    pub context: serde_json::Value,
}

impl PatchRequest {
    /// Request for identifier mapping
    #[must_use]
    pub fn map_identifiers(
        platform: AppPlatform,
        identifiers: Vec<String>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            task: Task::MapIdentifiers,
            instruction: "Suggest logical names and stable platform locators for the given identifiers."
                .to_string(),
            platform: Some(platform),
            identifiers,
            context,
        }
    }

    /// Request for a locator fix built from a prompt
    #[must_use]
    pub fn fix_locator(prompt: serde_json::Value) -> Self {
        Self {
            task: Task::FixLocator,
            instruction: "Propose a replacement locator for the failing test.".to_string(),
            platform: None,
            identifiers: Vec::new(),
            context: prompt,
        }
    }

    /// Request for a text rename
    #[must_use]
    pub fn text_rename(prompt: serde_json::Value) -> Self {
        Self {
            task: Task::TextRename,
            instruction: "Confirm the text rename across the tests repository.".to_string(),
            platform: None,
            identifiers: Vec::new(),
            context: prompt,
        }
    }

    fn summary(&self, limit: usize) -> String {
        let text = serde_json::to_string(self).unwrap_or_default();
        text.chars().take(limit).collect()
    }
}

/// Per-identifier suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSuggestion {
    /// Identifier found in the app source
    pub identifier: String,
    /// Logical name to update
    #[serde(default)]
    pub logical: String,
    /// Android locator, empty when not applicable
    #[serde(default)]
    pub android: String,
    /// iOS locator, empty when not applicable
    #[serde(default)]
    pub ios: String,
}

/// Structured provider response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResponse {
    /// Identifier mapping suggestions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<MappingSuggestion>,
    /// Patch body; `noop` when the provider declined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Explanation from the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Model that answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Truncated request echo for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_summary: Option<String>,
}

impl PatchResponse {
    /// A declined, no-op response
    #[must_use]
    pub fn noop(explanation: impl Into<String>, prompt_summary: String) -> Self {
        Self {
            suggestions: Vec::new(),
            patch: Some("noop".to_string()),
            explanation: Some(explanation.into()),
            model: None,
            prompt_summary: Some(prompt_summary),
        }
    }

    /// Whether the provider declined to change anything
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.suggestions.is_empty() && self.patch.as_deref().map_or(true, |p| p == "noop")
    }
}

/// Provider failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Backend could not be reached
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    /// Backend answered with something unusable
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A language-model backend
pub trait LlmProvider {
    /// Provider name for logs and `llm_info` artifacts
    fn name(&self) -> &str;

    /// Answer a structured request
    fn generate_patch(&self, request: &PatchRequest) -> Result<PatchResponse, ProviderError>;
}

/// No-op provider used when no model is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedProvider;

impl LlmProvider for RuleBasedProvider {
    fn name(&self) -> &str {
        "rulebased"
    }

    fn generate_patch(&self, request: &PatchRequest) -> Result<PatchResponse, ProviderError> {
        Ok(PatchResponse::noop("rulebased fallback", request.summary(500)))
    }
}

/// Known catalogue items and their logical names
const CATALOGUE: [(&str, &str); 6] = [
    ("hoodie", "us.mappings.yourOrders.hoodieProduct"),
    ("cap", "us.mappings.yourOrders.capProduct"),
    ("shirt", "us.mappings.yourOrders.shirtProduct"),
    ("bottle", "us.mappings.yourOrders.bottleProduct"),
    ("headphones", "us.mappings.yourOrders.headphonesProduct"),
    ("vip", "us.mappings.yourOrders.vipProduct"),
];

/// Deterministic local stand-in for a chat model.
///
/// Produces concrete identifier-mapping suggestions so a pipeline can be
/// exercised end to end without network access.
#[derive(Debug, Clone)]
pub struct HeuristicProvider {
    model: String,
    temperature: f64,
}

impl HeuristicProvider {
    /// Create the provider
    #[must_use]
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        let model = model.into();
        Self {
            model: if model.is_empty() {
                "gpt-4o".to_string()
            } else {
                model
            },
            temperature,
        }
    }

    /// Sampling temperature recorded for audit
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Guess a logical name for an identifier
    #[must_use]
    pub fn logical_for(identifier: &str) -> String {
        if let Some(item) = identifier.strip_prefix("product_sku_") {
            return CATALOGUE
                .iter()
                .find(|(name, _)| *name == item)
                .map_or_else(
                    || format!("us.mappings.catalog.{item}Product"),
                    |(_, logical)| (*logical).to_string(),
                );
        }
        let safe = non_alnum().replace_all(identifier, "_");
        format!("us.mappings.auto.{}", safe.trim_matches('_'))
    }
}

#[allow(clippy::expect_used)]
fn non_alnum() -> &'static Regex {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    NON_ALNUM.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static pattern"))
}

impl LlmProvider for HeuristicProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate_patch(&self, request: &PatchRequest) -> Result<PatchResponse, ProviderError> {
        if request.task != Task::MapIdentifiers {
            return Ok(PatchResponse::noop("rulebased fallback", request.summary(2000)));
        }
        let platform = request.platform.unwrap_or(AppPlatform::ReactNative);
        let suggestions = request
            .identifiers
            .iter()
            .map(|id| {
                let locators = platform.locators_for(id);
                MappingSuggestion {
                    identifier: id.clone(),
                    logical: Self::logical_for(id),
                    android: locators.android,
                    ios: locators.ios,
                }
            })
            .collect();
        Ok(PatchResponse {
            suggestions,
            patch: None,
            explanation: None,
            model: Some(self.model.clone()),
            prompt_summary: None,
        })
    }
}

/// Choose a provider from configuration.
///
/// `openai` selects the heuristic provider, `rulebased` (and its aliases)
/// the no-op one. Anything else uses the heuristic provider only when an API
/// key is configured.
#[must_use]
pub fn provider_from_config(config: &LlmConfig) -> Box<dyn LlmProvider> {
    let name = config.provider.trim().to_lowercase();
    match name.as_str() {
        "openai" | "open_ai" | "oai" => {
            Box::new(HeuristicProvider::new(&config.model, config.temperature))
        }
        "rulebased" | "rule-based" | "stub" | "fake" => Box::new(RuleBasedProvider),
        _ if !config.openai_api_key.is_empty() => {
            Box::new(HeuristicProvider::new(&config.model, config.temperature))
        }
        _ => Box::new(RuleBasedProvider),
    }
}
