//! Deterministic identifier → logical-name resolution.
//!
//! Tiers are tried in order and the first hit wins:
//!
//! 1. exact lookup in the configured map
//! 2. ordered regex patterns
//! 3. fuzzy match on the normalized base name
//!
//! Identifiers that fall through every tier are the only ones handed to a
//! language model.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::warn;

use crate::config::PatternRule;
use crate::strategy::MappingContext;

/// Which tier resolved an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    /// Exact map entry
    Exact,
    /// Regex pattern
    Pattern,
    /// Normalized base name
    Fuzzy,
}

/// A resolved logical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Logical name
    pub logical: String,
    /// Tier that produced it
    pub tier: ResolutionTier,
}

struct Suffixes {
    val: Regex,
    digits: Regex,
    words: Regex,
    separators: Regex,
}

#[allow(clippy::expect_used)]
fn suffixes() -> &'static Suffixes {
    static SUFFIXES: OnceLock<Suffixes> = OnceLock::new();
    SUFFIXES.get_or_init(|| Suffixes {
        val: Regex::new(r"(?i)[_-]val\d+$").expect("static pattern"),
        digits: Regex::new(r"\d+$").expect("static pattern"),
        words: Regex::new(r"(?i)(Premium|Plus|Deluxe|V\d+)$").expect("static pattern"),
        separators: Regex::new(r"[_-]+$").expect("static pattern"),
    })
}

/// Collapse suffix variations so related identifiers share a base.
///
/// `product_sku_cap_5454` → `product_sku_cap`,
/// `product_sku_shirt_val2` → `product_sku_shirt`,
/// `product_sku_hoodiePremium` → `product_sku_hoodie`.
#[must_use]
pub fn normalize_base(value: &str) -> String {
    let s = suffixes();
    let v = value.trim();
    let v = s.val.replace(v, "");
    let v = s.digits.replace(&v, "");
    let v = s.words.replace(&v, "");
    s.separators.replace(&v, "").into_owned()
}

/// Three-tier resolver over one platform's maps
#[derive(Debug, Clone, Default)]
pub struct IdentifierResolver {
    exact: BTreeMap<String, String>,
    patterns: Vec<(Regex, String)>,
}

impl IdentifierResolver {
    /// Build a resolver; invalid patterns are skipped with a warning
    #[must_use]
    pub fn new(exact: BTreeMap<String, String>, rules: &[PatternRule]) -> Self {
        let patterns = rules
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(re) => Some((re, rule.logical.clone())),
                Err(e) => {
                    warn!(pattern = %rule.pattern, error = %e, "Skipping invalid identifier pattern");
                    None
                }
            })
            .collect();
        Self { exact, patterns }
    }

    /// Build a resolver from a mapping context
    #[must_use]
    pub fn from_context(ctx: &MappingContext) -> Self {
        Self::new(ctx.exact.clone(), &ctx.patterns)
    }

    /// Exact-match lookup
    #[must_use]
    pub fn by_exact(&self, value: &str) -> Option<&str> {
        self.exact.get(value).map(String::as_str)
    }

    /// First matching pattern
    #[must_use]
    pub fn by_pattern(&self, value: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(value))
            .map(|(_, logical)| logical.as_str())
    }

    /// Normalized-base lookup, then the longest map key the raw or
    /// normalized value starts with
    #[must_use]
    pub fn by_fuzzy(&self, value: &str) -> Option<&str> {
        let base = normalize_base(value);
        if let Some(logical) = self.exact.get(&base) {
            return Some(logical.as_str());
        }
        self.exact
            .iter()
            .filter(|(key, _)| !key.is_empty() && (value.starts_with(*key) || base.starts_with(*key)))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, logical)| logical.as_str())
    }

    /// Resolve through all tiers
    #[must_use]
    pub fn resolve(&self, value: &str) -> Option<Resolution> {
        let hit = |logical: &str, tier| Resolution {
            logical: logical.to_string(),
            tier,
        };
        self.by_exact(value)
            .map(|l| hit(l, ResolutionTier::Exact))
            .or_else(|| self.by_pattern(value).map(|l| hit(l, ResolutionTier::Pattern)))
            .or_else(|| self.by_fuzzy(value).map(|l| hit(l, ResolutionTier::Fuzzy)))
    }

    /// Split identifiers into resolved pairs and unresolved leftovers
    #[must_use]
    pub fn partition(&self, identifiers: &[String]) -> (Vec<(String, Resolution)>, Vec<String>) {
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();
        for id in identifiers {
            match self.resolve(id) {
                Some(r) => resolved.push((id.clone(), r)),
                None => unresolved.push(id.clone()),
            }
        }
        (resolved, unresolved)
    }
}
