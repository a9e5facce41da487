//! Append-only audit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::model::ValidationResult;
use crate::result::{HealError, HealResult};

/// One audit record. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique id
    pub id: Uuid,
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
    /// What was attempted (`heal`, `pipeline`, `update_mappings`, ...)
    pub action: String,
    /// Workspace the action ran in
    pub workspace: PathBuf,
    /// Short description of the patch
    #[serde(default)]
    pub patch_summary: String,
    /// Validation verdict, when one was computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    /// Terminal status (`healed`, `failed_validation`, `merged`, ...)
    pub outcome: String,
}

impl LedgerEntry {
    /// New entry stamped now
    #[must_use]
    pub fn new(action: impl Into<String>, workspace: impl Into<PathBuf>, outcome: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: action.into(),
            workspace: workspace.into(),
            patch_summary: String::new(),
            validation: None,
            outcome: outcome.into(),
        }
    }

    /// Attach a patch summary
    #[must_use]
    pub fn with_patch_summary(mut self, summary: impl Into<String>) -> Self {
        self.patch_summary = summary.into();
        self
    }

    /// Attach a validation result
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationResult) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Write-only sink for ledger entries
pub trait LedgerSink {
    /// Append one entry
    fn append(&self, entry: &LedgerEntry) -> HealResult<()>;
}

/// JSON-lines ledger file, opened in append mode per write
#[derive(Debug, Clone)]
pub struct JsonlLedger {
    path: PathBuf,
}

impl JsonlLedger {
    /// Ledger at `path`; parent directories are created on first append
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry in file order; a missing file is an empty ledger
    pub fn read_all(&self) -> HealResult<Vec<LedgerEntry>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HealError::ledger(e.to_string())),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(HealError::from))
            .collect()
    }
}

impl LedgerSink for JsonlLedger {
    fn append(&self, entry: &LedgerEntry) -> HealResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HealError::ledger(e.to_string()))?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HealError::ledger(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .map_err(|e| HealError::ledger(e.to_string()))
    }
}
