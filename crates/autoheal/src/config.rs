//! Configuration loaded once at startup and passed explicitly to components.
//!
//! The file is YAML. Every section has defaults so a partial file loads.
//! String values written as `${NAME:-fallback}` are resolved against the
//! environment before deserialization.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::result::{HealError, HealResult};

/// Mapping file names looked up in each module directory
pub const DEFAULT_MAPPING_FILES: [&str; 4] = [
    "mappings-android.yaml",
    "mappings-ios.yaml",
    "mappings-android-spanish.yaml",
    "mappings-ios-spanish.yaml",
];

/// Language-model provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (`openai`, `rulebased`, ...)
    pub provider: String,
    /// OpenAI API key (never written to artifacts)
    pub openai_api_key: String,
    /// Anthropic API key (never written to artifacts)
    pub anthropic_api_key: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "rulebased".to_string(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: 0.1,
        }
    }
}

/// Retrieval index settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Backend name (`local`)
    pub provider: String,
    /// API key for hosted backends
    pub api_key: String,
    /// Index name
    pub index_name: String,
    /// Directory holding the local index
    pub base_path: PathBuf,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            api_key: String::new(),
            index_name: "autoheal".to_string(),
            base_path: PathBuf::from(".vectordb"),
        }
    }
}

/// Source-control settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    /// Provider name (`github`)
    pub provider: String,
    /// API token
    pub github_token: String,
    /// `owner/name` of the tests repository
    pub repo: String,
    /// Branch pull requests target
    pub base_branch: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            provider: "github".to_string(),
            github_token: String::new(),
            repo: String::new(),
            base_branch: "main".to_string(),
        }
    }
}

/// Test-runner settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    /// CI provider name
    pub provider: String,
    /// Command template, `{test}` is replaced by the test identifier
    pub test_command: String,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            test_command: "python -m pytest -q {test}".to_string(),
        }
    }
}

/// Artifact store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactStoreConfig {
    /// Directory artifacts are written to
    pub path: PathBuf,
}

impl Default for ArtifactStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("artifacts"),
        }
    }
}

/// Validation policy settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Optional policy file
    pub file: String,
}

/// Logging and ledger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,
    /// Append-only ledger file
    pub patch_ledger: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            patch_ledger: PathBuf::from("artifacts/patch_ledger.jsonl"),
        }
    }
}

/// Ordered regex rule mapping identifiers to a logical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Regular expression searched in the identifier
    #[serde(rename = "match")]
    pub pattern: String,
    /// Logical name produced on match
    pub logical: String,
}

/// App-side identifier mapping settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `react_native`, `ios_native` or `android_native`
    pub platform: String,
    /// React Native testID → logical name
    pub testid_to_logical: BTreeMap<String, String>,
    /// React Native testID patterns
    pub testid_patterns: Vec<PatternRule>,
    /// iOS identifier → logical name
    pub ios_to_logical: BTreeMap<String, String>,
    /// iOS identifier patterns
    pub ios_patterns: Vec<PatternRule>,
    /// Android identifier → logical name
    pub android_to_logical: BTreeMap<String, String>,
    /// Android identifier patterns
    pub android_patterns: Vec<PatternRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            platform: "react_native".to_string(),
            testid_to_logical: BTreeMap::new(),
            testid_patterns: Vec::new(),
            ios_to_logical: BTreeMap::new(),
            ios_patterns: Vec::new(),
            android_to_logical: BTreeMap::new(),
            android_patterns: Vec::new(),
        }
    }
}

/// App source globs per platform, relative to the app repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFilesConfig {
    /// React Native sources
    pub react_native: Vec<String>,
    /// iOS sources
    pub ios_native: Vec<String>,
    /// Android sources
    pub android_native: Vec<String>,
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealConfig {
    /// Prefer accessibility identifiers over label predicates on iOS
    pub prefer_accessibility: bool,
    /// Target artifact patched for web failures, relative to the tests dir
    pub web_target: PathBuf,
    /// Target artifact patched for iOS failures, relative to the tests dir
    pub ios_target: PathBuf,
    /// Target artifact patched for Android failures, relative to the tests dir
    pub android_target: PathBuf,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            prefer_accessibility: true,
            web_target: PathBuf::from("failing_test.py"),
            ios_target: PathBuf::from("ios_cart_test.py"),
            android_target: PathBuf::from("android_cart_test.py"),
        }
    }
}

/// Mapping-file walk settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingsConfig {
    /// Module tree root, relative to the tests repository
    pub modules_root: PathBuf,
    /// File names opened in each module
    pub files: Vec<String>,
    /// Whether localized variants are included
    pub include_locale_files: bool,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            modules_root: PathBuf::from("us/e2e-tests/modules"),
            files: DEFAULT_MAPPING_FILES.iter().map(ToString::to_string).collect(),
            include_locale_files: true,
        }
    }
}

/// Complete Autoheal configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model
    pub llm: LlmConfig,
    /// Retrieval index
    pub vectordb: VectorDbConfig,
    /// Source control
    pub vcs: VcsConfig,
    /// Test runner
    pub ci: CiConfig,
    /// Artifact store
    pub artifact_store: ArtifactStoreConfig,
    /// Policy
    pub policy: PolicyConfig,
    /// Logging and ledger
    pub logging: LoggingConfig,
    /// Identifier mapping
    pub app: AppConfig,
    /// Source globs for identifier discovery
    pub source_files: SourceFilesConfig,
    /// Orchestrator
    pub heal: HealConfig,
    /// Mapping-file walk
    pub mappings: MappingsConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> HealResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            HealError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse configuration from YAML text, resolving `${VAR:-default}` values
    pub fn from_yaml_str(text: &str) -> HealResult<Self> {
        Self::from_yaml_str_with(text, |name| std::env::var(name).ok())
    }

    /// Parse configuration with a custom environment lookup
    pub fn from_yaml_str_with<F>(text: &str, lookup: F) -> HealResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut value: Value = serde_yaml_ng::from_str(text)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        resolve_env_templates(&mut value, &lookup);
        serde_yaml_ng::from_value(value).map_err(|e| HealError::config(e.to_string()))
    }

    /// Set the artifact directory
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_store.path = dir.into();
        self
    }

    /// Set the ledger path
    #[must_use]
    pub fn with_ledger(mut self, path: impl Into<PathBuf>) -> Self {
        self.logging.patch_ledger = path.into();
        self
    }

    /// Set the LLM provider name
    #[must_use]
    pub fn with_llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm.provider = provider.into();
        self
    }
}

#[allow(clippy::expect_used)]
fn env_template() -> &'static Regex {
    static TEMPLATE: OnceLock<Regex> = OnceLock::new();
    TEMPLATE.get_or_init(|| {
        Regex::new(r"^\$\{\s*([A-Za-z0-9_]+)\s*(?::-\s*([^}]*?))?\s*\}$")
            .expect("static pattern")
    })
}

/// Resolve a single `${NAME:-default}` string; other strings pass through.
pub fn resolve_env_template<F>(raw: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match env_template().captures(raw.trim()) {
        Some(caps) => {
            let name = &caps[1];
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            lookup(name).unwrap_or_else(|| fallback.to_string())
        }
        None => raw.to_string(),
    }
}

fn resolve_env_templates<F>(value: &mut Value, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => *s = resolve_env_template(s, lookup),
        Value::Sequence(items) => {
            for item in items {
                resolve_env_templates(item, lookup);
            }
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                resolve_env_templates(v, lookup);
            }
        }
        Value::Tagged(tagged) => resolve_env_templates(&mut tagged.value, lookup),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
