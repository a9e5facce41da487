//! Single-line locator patches.
//!
//! A target test artifact declares its locator on exactly one
//! `LOCATOR = ...` line. Applying a patch rewrites that line's right-hand
//! side and nothing else, so the audit diff is always one line and a revert
//! is a plain overwrite with the saved original text.

use regex::Regex;
use similar::TextDiff;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::model::{LocatorValue, PatchResult};
use crate::result::{HealError, HealResult};

#[allow(clippy::expect_used)]
fn sentinel() -> &'static Regex {
    static SENTINEL: OnceLock<Regex> = OnceLock::new();
    SENTINEL.get_or_init(|| Regex::new(r"^(\s*)LOCATOR\s*=(?:[^=]|$)").expect("static pattern"))
}

fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Number of `LOCATOR = ...` lines in `text`
#[must_use]
pub fn count_sentinels(text: &str) -> usize {
    text.lines().filter(|l| sentinel().is_match(l)).count()
}

/// Substitute the locator in `original`.
///
/// The sentinel line keeps its indentation and line ending. Text without a
/// sentinel comes back unchanged; more than one sentinel is an error.
pub fn render(original: &str, value: &LocatorValue, path: &Path) -> HealResult<String> {
    let count = count_sentinels(original);
    if count > 1 {
        return Err(HealError::AmbiguousSentinel {
            path: path.to_path_buf(),
            count,
        });
    }

    let literal = value.to_literal();
    let mut out = String::with_capacity(original.len() + literal.len());
    for line in original.split_inclusive('\n') {
        match sentinel().captures(line) {
            Some(caps) => {
                out.push_str(&caps[1]);
                out.push_str("LOCATOR = ");
                out.push_str(&literal);
                out.push_str(line_ending(line));
            }
            None => out.push_str(line),
        }
    }
    Ok(out)
}

/// Unified diff with `a/<name>` / `b/<name>` headers; empty when equal
#[must_use]
pub fn unified_diff(original: &str, patched: &str, filename: &str) -> String {
    if original == patched {
        return String::new();
    }
    TextDiff::from_lines(original, patched)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{filename}"), &format!("b/{filename}"))
        .to_string()
}

/// Applies and reverts locator patches on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchApplier;

impl PatchApplier {
    /// Create an applier
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Rewrite the sentinel line of `target` with `value`.
    ///
    /// The file is only written when the text changes. `ok` reports that the
    /// patch was written; verification narrows it later.
    pub fn apply(&self, target: &Path, value: &LocatorValue) -> HealResult<PatchResult> {
        self.apply_with(target, value, |path, text| std::fs::write(path, text))
    }

    /// `apply` through a custom writer. A failed write restores
    /// `original_text` before the error is returned.
    fn apply_with<W>(&self, target: &Path, value: &LocatorValue, mut write: W) -> HealResult<PatchResult>
    where
        W: FnMut(&Path, &str) -> std::io::Result<()>,
    {
        let original_text = std::fs::read_to_string(target)?;
        let patched_text = render(&original_text, value, target)?;
        let filename = target
            .file_name()
            .map_or_else(|| target.display().to_string(), |n| n.to_string_lossy().into_owned());
        let diff = unified_diff(&original_text, &patched_text, &filename);

        if patched_text == original_text {
            debug!(target = %target.display(), "No LOCATOR line changed");
        } else {
            if let Err(e) = write(target, &patched_text) {
                warn!(target = %target.display(), error = %e, "Patch write failed, restoring original");
                if let Err(restore) = std::fs::write(target, &original_text) {
                    warn!(target = %target.display(), error = %restore, "Restore after failed write failed");
                }
                return Err(e.into());
            }
            info!(target = %target.display(), literal = %value.to_literal(), "Applied locator patch");
        }

        Ok(PatchResult {
            ok: true,
            diff,
            patched_text,
            original_text,
        })
    }

    /// Restore `target` to `original_text`, byte for byte
    pub fn revert(&self, target: &Path, original_text: &str) -> HealResult<()> {
        std::fs::write(target, original_text)?;
        info!(target = %target.display(), "Reverted locator patch");
        Ok(())
    }
}
