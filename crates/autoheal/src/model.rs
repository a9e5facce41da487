//! Core data model shared by strategies, the patch applier and the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::result::HealError;

/// Platform a failing test targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Browser test driven by an HTML snapshot
    Web,
    /// iOS test driven by an accessibility-tree XML snapshot
    Ios,
    /// Android test (no default strategy)
    Android,
}

impl Platform {
    /// Lowercase tag used in artifacts and ledger entries
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(HealError::invalid_input(format!(
                "unknown platform '{other}' (expected web, ios or android)"
            ))),
        }
    }
}

/// Captured description of a failing test. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Test identifier handed to the executor
    pub test_id: String,
    /// Error text reported by the executor
    pub error: Option<String>,
    /// Path of the UI snapshot captured at failure time
    pub snapshot: PathBuf,
    /// Workspace the test lives in
    pub workspace: PathBuf,
    /// Platform tag
    pub platform: Platform,
}

/// Which strategy produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    /// HTML id heuristic
    WebHeuristic,
    /// iOS accessibility identifier
    IosAccessibilityId,
    /// iOS label predicate
    IosPredicate,
    /// Language-model identifier mapping
    LlmMapping,
}

/// Locator strategy understood by iOS test drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IosLocatorStrategy {
    /// `accessibility_id`
    AccessibilityId,
    /// `ios_predicate`
    IosPredicate,
}

impl IosLocatorStrategy {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessibilityId => "accessibility_id",
            Self::IosPredicate => "ios_predicate",
        }
    }
}

/// Strategy-specific locator payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocatorValue {
    /// Plain element id (web)
    Id(String),
    /// `{strategy, value}` pair (iOS)
    Ios {
        /// iOS locator strategy
        strategy: IosLocatorStrategy,
        /// Locator value
        value: String,
    },
    /// Logical name with per-platform locators (mapping files)
    Mapping {
        /// Logical name used in mapping files
        logical: String,
        /// Android locator, empty when not applicable
        android_locator: String,
        /// iOS locator, empty when not applicable
        ios_locator: String,
    },
}

impl LocatorValue {
    /// Render the value as a source literal for the `LOCATOR = ...` line.
    ///
    /// Scalars become a quoted string, structured values a map literal.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::Id(id) => quote(id),
            Self::Ios { strategy, value } => format!(
                "{{\"strategy\": {}, \"value\": {}}}",
                quote(strategy.as_str()),
                quote(value)
            ),
            Self::Mapping {
                logical,
                android_locator,
                ios_locator,
            } => format!(
                "{{\"logical\": {}, \"android\": {}, \"ios\": {}}}",
                quote(logical),
                quote(android_locator),
                quote(ios_locator)
            ),
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// A proposed replacement locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    /// Strategy that produced the candidate
    pub strategy: StrategyTag,
    /// Locator payload
    pub value: LocatorValue,
    /// Human-readable explanation
    pub rationale: String,
}

impl LocatorCandidate {
    /// Create a candidate
    #[must_use]
    pub fn new(strategy: StrategyTag, value: LocatorValue, rationale: impl Into<String>) -> Self {
        Self {
            strategy,
            value,
            rationale: rationale.into(),
        }
    }
}

/// Outcome of applying a locator patch to a target artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResult {
    /// Written and (once verified) passing
    pub ok: bool,
    /// Unified diff, empty when nothing changed
    pub diff: String,
    /// Text written to the target
    pub patched_text: String,
    /// Text the target held before the patch
    pub original_text: String,
}

impl PatchResult {
    /// Narrow `ok` to the outcome of re-running the test
    #[must_use]
    pub fn verified(mut self, passed: bool) -> Self {
        self.ok = self.ok && passed;
        self
    }

    /// Whether the patch changed any byte of the target
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.patched_text == self.original_text
    }

    /// Number of replaced lines in the diff
    #[must_use]
    pub fn changed_lines(&self) -> usize {
        changed_lines(&self.diff)
    }
}

/// Count replaced lines of a unified diff (max of removals and additions).
#[must_use]
pub fn changed_lines(diff: &str) -> usize {
    let mut added = 0;
    let mut removed = 0;
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') {
            removed += 1;
        }
    }
    added.max(removed)
}

/// Result of validating a patch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Overall verdict
    pub ok: bool,
    /// Whether the re-run test passed
    pub tests_passed: bool,
    /// Whether structural/policy checks passed
    pub policy_ok: bool,
    /// Number of replaced lines
    pub changed_lines: usize,
    /// Free-form details (reasons, paths)
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ValidationResult {
    /// A passing structural check
    #[must_use]
    pub fn pass() -> Self {
        Self {
            ok: true,
            tests_passed: false,
            policy_ok: true,
            changed_lines: 0,
            details: BTreeMap::new(),
        }
    }

    /// A failing structural check with a reason
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert(
            "reason".to_string(),
            serde_json::Value::String(reason.into()),
        );
        Self {
            ok: false,
            tests_passed: false,
            policy_ok: false,
            changed_lines: 0,
            details,
        }
    }

    /// Add a detail entry
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Rejection reason, if any
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.details.get("reason").and_then(|v| v.as_str())
    }
}

/// Identifier change for one logical name across mapping files.
///
/// An empty identifier means "leave that platform alone".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingUpdate {
    /// Logical name (`name` field in mapping records)
    pub logical_name: String,
    /// New android identifier
    #[serde(default)]
    pub android_identifier: String,
    /// New iOS identifier
    #[serde(default)]
    pub ios_identifier: String,
}

impl MappingUpdate {
    /// Create an update
    #[must_use]
    pub fn new(
        logical_name: impl Into<String>,
        android_identifier: impl Into<String>,
        ios_identifier: impl Into<String>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            android_identifier: android_identifier.into(),
            ios_identifier: ios_identifier.into(),
        }
    }

    /// Identifier requested for a platform, `None` when left alone
    #[must_use]
    pub fn identifier_for(&self, platform: Platform) -> Option<&str> {
        let id = match platform {
            Platform::Android => self.android_identifier.as_str(),
            Platform::Ios => self.ios_identifier.as_str(),
            Platform::Web => "",
        };
        (!id.is_empty()).then_some(id)
    }
}
