//! Language-model identifier mapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::ProposalStrategy;
use crate::config::{AppConfig, PatternRule};
use crate::discovery::AppPlatform;
use crate::model::{LocatorCandidate, LocatorValue, StrategyTag};
use crate::provider::{LlmProvider, PatchRequest, ProviderError};

/// Existing maps sent to the provider as grounding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingContext {
    /// Identifier → logical name
    pub exact: BTreeMap<String, String>,
    /// Ordered identifier patterns
    pub patterns: Vec<PatternRule>,
    /// Retrieved records, passed through verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieved: Vec<serde_json::Value>,
}

impl MappingContext {
    /// The exact map and patterns configured for a platform
    #[must_use]
    pub fn from_app(app: &AppConfig, platform: AppPlatform) -> Self {
        let (exact, patterns) = match platform {
            AppPlatform::ReactNative => (&app.testid_to_logical, &app.testid_patterns),
            AppPlatform::IosNative => (&app.ios_to_logical, &app.ios_patterns),
            AppPlatform::AndroidNative => (&app.android_to_logical, &app.android_patterns),
        };
        Self {
            exact: exact.clone(),
            patterns: patterns.clone(),
            retrieved: Vec::new(),
        }
    }

    /// Attach retrieved records
    #[must_use]
    pub fn with_retrieved(mut self, retrieved: Vec<serde_json::Value>) -> Self {
        self.retrieved = retrieved;
        self
    }
}

/// Maps unresolved identifiers to logical names through a provider.
///
/// Suggestions without a logical name are dropped. A declining provider
/// yields an empty batch.
pub struct LlmMapping<'a> {
    provider: &'a dyn LlmProvider,
    platform: AppPlatform,
}

impl std::fmt::Debug for LlmMapping<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmMapping")
            .field("provider", &self.provider.name())
            .field("platform", &self.platform)
            .finish()
    }
}

impl<'a> LlmMapping<'a> {
    /// Create the strategy
    #[must_use]
    pub fn new(provider: &'a dyn LlmProvider, platform: AppPlatform) -> Self {
        Self { provider, platform }
    }

    /// Propose a mapping candidate per identifier
    pub fn propose_batch(
        &self,
        identifiers: &[String],
        context: &MappingContext,
    ) -> Result<Vec<LocatorCandidate>, ProviderError> {
        if identifiers.is_empty() {
            return Ok(Vec::new());
        }
        let ctx = serde_json::to_value(context)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let request = PatchRequest::map_identifiers(self.platform, identifiers.to_vec(), ctx);
        let response = self.provider.generate_patch(&request)?;
        if response.is_noop() {
            debug!(provider = self.provider.name(), "Provider declined identifier mapping");
            return Ok(Vec::new());
        }

        let provider = self.provider.name();
        Ok(response
            .suggestions
            .into_iter()
            .filter(|s| !s.logical.is_empty() && identifiers.contains(&s.identifier))
            .map(|s| {
                let rationale = format!(
                    "Mapped '{}' to '{}' via {provider}.",
                    s.identifier, s.logical
                );
                LocatorCandidate::new(
                    StrategyTag::LlmMapping,
                    LocatorValue::Mapping {
                        logical: s.logical,
                        android_locator: s.android,
                        ios_locator: s.ios,
                    },
                    rationale,
                )
            })
            .collect())
    }
}

impl ProposalStrategy for LlmMapping<'_> {
    fn name(&self) -> &'static str {
        "llm_mapping"
    }

    /// Treats `old_locator` as a single identifier; the snapshot is unused.
    fn propose(&self, old_locator: &str, _snapshot: &str) -> Option<LocatorCandidate> {
        match self.propose_batch(&[old_locator.to_string()], &MappingContext::default()) {
            Ok(candidates) => candidates.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "Identifier mapping failed");
                None
            }
        }
    }
}
