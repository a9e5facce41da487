//! Structural patch validation.

use std::path::Path;
use tracing::debug;

use crate::model::ValidationResult;

/// Checks a patch payload before and after it is applied
pub trait PatchValidator {
    /// Validate `patch` against `workspace`
    fn validate(&self, workspace: &Path, patch: &serde_json::Value) -> ValidationResult;
}

/// Workspace must be a directory and the patch a JSON object.
///
/// With a line limit, a `diff` field in the patch must not replace more
/// lines than allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator {
    max_changed_lines: Option<usize>,
}

impl StructuralValidator {
    /// Create a validator without a line limit
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_changed_lines: None,
        }
    }

    /// Reject diffs replacing more than `limit` lines
    #[must_use]
    pub const fn with_max_changed_lines(mut self, limit: usize) -> Self {
        self.max_changed_lines = Some(limit);
        self
    }
}

impl PatchValidator for StructuralValidator {
    fn validate(&self, workspace: &Path, patch: &serde_json::Value) -> ValidationResult {
        if !workspace.is_dir() {
            debug!(workspace = %workspace.display(), "Workspace missing");
            return ValidationResult::reject("workspace missing");
        }
        let Some(record) = patch.as_object() else {
            return ValidationResult::reject("patch must be an object");
        };

        let changed = record
            .get("diff")
            .and_then(|d| d.as_str())
            .map_or(0, crate::model::changed_lines);
        if let Some(limit) = self.max_changed_lines {
            if changed > limit {
                return ValidationResult::reject(format!(
                    "patch replaces {changed} lines, limit is {limit}"
                ));
            }
        }

        let mut result = ValidationResult::pass();
        result.changed_lines = changed;
        result
    }
}
