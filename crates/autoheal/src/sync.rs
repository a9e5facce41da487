//! Plan mapping updates from identifiers discovered in app sources.
//!
//! Identifiers resolved by the configured maps become updates directly; the
//! rest go to the provider in one batch. The merged plan holds each
//! `(logical, android, ios)` triple once, rule-based entries first.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::discovery::AppPlatform;
use crate::model::{LocatorCandidate, LocatorValue, MappingUpdate};
use crate::provider::{LlmProvider, ProviderError};
use crate::resolve::IdentifierResolver;
use crate::strategy::{LlmMapping, MappingContext};

/// Planned updates and how they were found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePlan {
    /// De-duplicated updates in apply order
    pub updates: Vec<MappingUpdate>,
    /// Identifiers resolved by configured maps
    pub rule_mapped: Vec<String>,
    /// Identifiers sent to the provider
    pub unresolved: Vec<String>,
    /// Provider candidates, before de-duplication
    pub suggestions: Vec<LocatorCandidate>,
}

impl UpdatePlan {
    /// Whether nothing needs updating
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

fn push_unique(updates: &mut Vec<MappingUpdate>, seen: &mut HashSet<MappingUpdate>, update: MappingUpdate) {
    if seen.insert(update.clone()) {
        updates.push(update);
    }
}

/// Build the update plan for `identifiers`.
///
/// With `only_logical`, updates for other logical names are dropped after
/// merging. The provider is not called when every identifier resolves.
pub fn plan_updates(
    platform: AppPlatform,
    identifiers: &[String],
    context: &MappingContext,
    provider: &dyn LlmProvider,
    only_logical: Option<&str>,
) -> Result<UpdatePlan, ProviderError> {
    let resolver = IdentifierResolver::from_context(context);
    let (resolved, unresolved) = resolver.partition(identifiers);

    let mut plan = UpdatePlan::default();
    let mut seen = HashSet::new();
    for (id, resolution) in resolved {
        let locators = platform.locators_for(&id);
        debug!(identifier = %id, logical = %resolution.logical, tier = ?resolution.tier, "Resolved identifier");
        push_unique(
            &mut plan.updates,
            &mut seen,
            MappingUpdate::new(resolution.logical, locators.android, locators.ios),
        );
        plan.rule_mapped.push(id);
    }

    if !unresolved.is_empty() {
        plan.suggestions = LlmMapping::new(provider, platform).propose_batch(&unresolved, context)?;
        for candidate in &plan.suggestions {
            if let LocatorValue::Mapping {
                logical,
                android_locator,
                ios_locator,
            } = &candidate.value
            {
                push_unique(
                    &mut plan.updates,
                    &mut seen,
                    MappingUpdate::new(logical.clone(), android_locator.clone(), ios_locator.clone()),
                );
            }
        }
    }
    plan.unresolved = unresolved;

    if let Some(logical) = only_logical.filter(|l| !l.is_empty()) {
        plan.updates.retain(|u| u.logical_name == logical);
    }
    info!(
        platform = %platform,
        updates = plan.updates.len(),
        rule_mapped = plan.rule_mapped.len(),
        unresolved = plan.unresolved.len(),
        "Planned mapping updates"
    );
    Ok(plan)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::PatternRule;
    use crate::provider::{HeuristicProvider, PatchRequest, PatchResponse, RuleBasedProvider};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn context() -> MappingContext {
        let mut ctx = MappingContext::default();
        ctx.exact.insert(
            "checkout_button".to_string(),
            "us.mappings.cart.checkout".to_string(),
        );
        ctx.patterns.push(PatternRule {
            pattern: "^cart_total_\\d+$".to_string(),
            logical: "us.mappings.cart.total".to_string(),
        });
        ctx
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    struct CountingProvider {
        calls: Cell<usize>,
    }

    impl LlmProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn generate_patch(&self, request: &PatchRequest) -> Result<PatchResponse, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            RuleBasedProvider.generate_patch(request)
        }
    }

    #[test]
    fn test_resolved_ids_skip_provider() {
        let provider = CountingProvider { calls: Cell::new(0) };
        let plan = plan_updates(
            AppPlatform::ReactNative,
            &ids(&["checkout_button", "cart_total_2"]),
            &context(),
            &provider,
            None,
        )
        .unwrap();
        assert_eq!(provider.calls.get(), 0);
        assert_eq!(plan.updates.len(), 2);
        assert_eq!(plan.updates[0].logical_name, "us.mappings.cart.checkout");
        assert_eq!(
            plan.updates[0].android_identifier,
            "//*[@content-desc='checkout_button'] | //*[@resource-id='checkout_button']"
        );
        assert_eq!(plan.updates[0].ios_identifier, "//*[@name='checkout_button']");
        assert!(plan.unresolved.is_empty());
    }

    #[test]
    fn test_unresolved_go_to_provider() {
        let provider = HeuristicProvider::new("gpt-4o", 0.0);
        let plan = plan_updates(
            AppPlatform::ReactNative,
            &ids(&["checkout_button", "product_sku_hoodie"]),
            &context(),
            &provider,
            None,
        )
        .unwrap();
        assert_eq!(plan.unresolved, ids(&["product_sku_hoodie"]));
        assert_eq!(plan.suggestions.len(), 1);
        let names: Vec<&str> = plan.updates.iter().map(|u| u.logical_name.as_str()).collect();
        assert_eq!(names, vec!["us.mappings.cart.checkout", "us.mappings.yourOrders.hoodieProduct"]);
    }

    #[test]
    fn test_declining_provider_keeps_rule_updates() {
        let plan = plan_updates(
            AppPlatform::ReactNative,
            &ids(&["checkout_button", "mystery"]),
            &context(),
            &RuleBasedProvider,
            None,
        )
        .unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.unresolved, ids(&["mystery"]));
    }

    #[test]
    fn test_duplicate_triples_collapse() {
        let plan = plan_updates(
            AppPlatform::ReactNative,
            &ids(&["checkout_button", "checkout_button"]),
            &context(),
            &RuleBasedProvider,
            None,
        )
        .unwrap();
        assert_eq!(plan.updates.len(), 1);
    }

    #[test]
    fn test_logical_filter() {
        let plan = plan_updates(
            AppPlatform::ReactNative,
            &ids(&["checkout_button", "cart_total_1"]),
            &context(),
            &RuleBasedProvider,
            Some("us.mappings.cart.total"),
        )
        .unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].logical_name, "us.mappings.cart.total");
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_ios_native_updates_ios_only() {
        let mut ctx = MappingContext::default();
        ctx.exact.insert("SettingsButton".to_string(), "us.mappings.account.settings".to_string());
        let plan = plan_updates(AppPlatform::IosNative, &ids(&["SettingsButton"]), &ctx, &RuleBasedProvider, None)
            .unwrap();
        assert_eq!(plan.updates[0].android_identifier, "");
        assert_eq!(plan.updates[0].ios_identifier, "//*[@name='SettingsButton']");
    }
}
