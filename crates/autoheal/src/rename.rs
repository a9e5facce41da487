//! Literal text rename across a tests repository.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::discovery::walk_files;
use crate::result::{HealError, HealResult};

/// Outcome of a rename pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameReport {
    /// UTF-8 files read
    pub scanned: usize,
    /// Files rewritten
    pub changed_files: usize,
    /// Rewritten paths, in walk order
    pub files: Vec<PathBuf>,
}

/// Replace every occurrence of `old` with `new` in the UTF-8 files under
/// `root`. Binary and unreadable files are skipped, as are hidden files
/// and directories such as `.git`.
pub fn find_and_replace_text(root: &Path, old: &str, new: &str) -> HealResult<RenameReport> {
    if old.is_empty() {
        return Err(HealError::invalid_input("rename source text is empty"));
    }
    let mut report = RenameReport::default();
    for path in walk_files(root) {
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        report.scanned += 1;
        if !text.contains(old) {
            continue;
        }
        let replaced = text.replace(old, new);
        if replaced == text {
            continue;
        }
        std::fs::write(&path, replaced)?;
        debug!(file = %path.display(), "Renamed text");
        report.changed_files += 1;
        report.files.push(path);
    }
    info!(
        scanned = report.scanned,
        changed = report.changed_files,
        "Text rename finished"
    );
    Ok(report)
}
