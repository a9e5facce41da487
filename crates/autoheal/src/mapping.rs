//! YAML mapping-file updates across a multi-module tests repository.
//!
//! Each module directory holds up to four mapping documents
//! (`mappings-android.yaml`, `mappings-ios.yaml` and their localized
//! variants). A document carries `android` and/or `ios` lists of
//! `{name, identifier}` records; an update rewrites the identifier of the
//! record whose `name` is the logical name, and only when it differs.

use serde::{Deserialize, Serialize};
use serde_yaml_ng::Mapping;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{MappingsConfig, DEFAULT_MAPPING_FILES};
use crate::model::{MappingUpdate, Platform};
use crate::result::HealResult;

/// One `{name, identifier}` record; other keys are kept as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    /// Logical name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Platform locator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Any other keys
    #[serde(flatten)]
    pub extra: Mapping,
}

/// A mapping document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    /// Android records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<Vec<MappingRecord>>,
    /// iOS records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios: Option<Vec<MappingRecord>>,
    /// Any other top-level keys
    #[serde(flatten)]
    pub extra: Mapping,
}

impl MappingDocument {
    /// Parse YAML text; tabs are normalized to two spaces first
    pub fn parse(text: &str) -> HealResult<Self> {
        let text = text.replace('\t', "  ");
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(&text)?)
    }

    /// Serialize with stable key order
    pub fn to_yaml(&self) -> HealResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    fn records_mut(&mut self, platform: Platform) -> Option<&mut Vec<MappingRecord>> {
        match platform {
            Platform::Android => self.android.as_mut(),
            Platform::Ios => self.ios.as_mut(),
            Platform::Web => None,
        }
    }

    /// Set the identifier of every `platform` record named `logical_name`.
    ///
    /// Returns whether anything changed.
    pub fn set_identifier(&mut self, platform: Platform, logical_name: &str, identifier: &str) -> bool {
        let Some(records) = self.records_mut(platform) else {
            return false;
        };
        let mut changed = false;
        for record in records
            .iter_mut()
            .filter(|r| r.name.as_deref() == Some(logical_name))
        {
            if record.identifier.as_deref() != Some(identifier) {
                record.identifier = Some(identifier.to_string());
                changed = true;
            }
        }
        changed
    }
}

/// Platform a mapping file belongs to, from its name
#[must_use]
pub fn platform_from_filename(filename: &str) -> Option<Platform> {
    let lower = filename.to_lowercase();
    if lower.contains("android") {
        Some(Platform::Android)
    } else if lower.contains("ios") {
        Some(Platform::Ios)
    } else {
        None
    }
}

/// Whether a mapping file is a localized variant (`mappings-ios-spanish.yaml`)
#[must_use]
pub fn is_locale_file(filename: &str) -> bool {
    let stem = filename.split('.').next().unwrap_or(filename).to_lowercase();
    let parts: Vec<&str> = stem.split(['-', '_']).collect();
    parts
        .iter()
        .position(|p| *p == "android" || *p == "ios")
        .is_some_and(|i| i + 1 < parts.len())
}

/// Outcome for one mapping file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    /// File path
    pub file: PathBuf,
    /// Platform from the file name
    pub platform: Option<Platform>,
    /// Whether the file was rewritten
    pub changed: bool,
    /// Whether the file was skipped as unparseable
    pub skipped: bool,
}

/// A file skipped because it did not parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    /// File path
    pub file: PathBuf,
    /// Parse error
    pub error: String,
}

/// Outcome of one [`MappingUpdate`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Logical name updated
    pub logical_name: String,
    /// Modules root that was walked
    pub modules_root: PathBuf,
    /// Number of files rewritten
    pub updated: usize,
    /// Per-file results
    pub files: Vec<FileResult>,
    /// Unparseable files
    pub skipped_bad_yaml: Vec<SkippedFile>,
    /// Set when the walk could not start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UpdateReport {
    /// Files rewritten by this update
    pub fn changed_files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().filter(|f| f.changed).map(|f| f.file.as_path())
    }
}

/// Aggregated outcome of several updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUpdateReport {
    /// Sum of `updated` over all updates
    pub total_updated: usize,
    /// Distinct files rewritten
    pub changed_files: BTreeSet<PathBuf>,
    /// Per-update reports, in input order
    pub results: Vec<UpdateReport>,
}

/// Walks module directories and applies identifier updates
#[derive(Debug, Clone)]
pub struct MappingUpdater {
    modules_root: PathBuf,
    files: Vec<String>,
}

impl Default for MappingUpdater {
    fn default() -> Self {
        Self::from_config(&MappingsConfig::default())
    }
}

impl MappingUpdater {
    /// Build from the `mappings` config section
    #[must_use]
    pub fn from_config(config: &MappingsConfig) -> Self {
        let files: Vec<String> = if config.files.is_empty() {
            DEFAULT_MAPPING_FILES.iter().map(ToString::to_string).collect()
        } else {
            config.files.clone()
        };
        let files = files
            .into_iter()
            .filter(|f| config.include_locale_files || !is_locale_file(f))
            .collect();
        Self {
            modules_root: config.modules_root.clone(),
            files,
        }
    }

    /// File names opened in each module
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    fn module_dirs(root: &Path) -> HealResult<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Apply one update to every module under `tests_repo`.
    ///
    /// A platform whose identifier is empty is not touched. Unparseable
    /// documents are reported and skipped.
    pub fn update(&self, tests_repo: &Path, update: &MappingUpdate) -> HealResult<UpdateReport> {
        let root = tests_repo.join(&self.modules_root);
        let mut report = UpdateReport {
            logical_name: update.logical_name.clone(),
            modules_root: root.clone(),
            ..UpdateReport::default()
        };
        if !root.is_dir() {
            warn!(root = %root.display(), "Modules directory not found");
            report.message = Some(format!("Modules dir not found: {}", root.display()));
            return Ok(report);
        }

        for module in Self::module_dirs(&root)? {
            for name in &self.files {
                let path = module.join(name);
                if !path.is_file() {
                    continue;
                }
                let platform = platform_from_filename(name);
                let identifier = platform.and_then(|p| update.identifier_for(p));
                if platform.is_some() && identifier.is_none() {
                    continue;
                }

                let parsed = std::fs::read_to_string(&path)
                    .map_err(crate::result::HealError::from)
                    .and_then(|text| MappingDocument::parse(&text));
                let mut doc = match parsed {
                    Ok(doc) => doc,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping unparseable mapping file");
                        report.skipped_bad_yaml.push(SkippedFile {
                            file: path.clone(),
                            error: e.to_string(),
                        });
                        report.files.push(FileResult {
                            file: path,
                            platform,
                            changed: false,
                            skipped: true,
                        });
                        continue;
                    }
                };

                let changed = match (platform, identifier) {
                    (Some(p), Some(id)) => doc.set_identifier(p, &update.logical_name, id),
                    _ => false,
                };
                if changed {
                    std::fs::write(&path, doc.to_yaml()?)?;
                    report.updated += 1;
                    debug!(file = %path.display(), logical = %update.logical_name, "Mapping updated");
                }
                report.files.push(FileResult {
                    file: path,
                    platform,
                    changed,
                    skipped: false,
                });
            }
        }
        info!(logical = %update.logical_name, updated = report.updated, "Mapping update finished");
        Ok(report)
    }

    /// Apply several updates independently and aggregate the results
    pub fn update_many(&self, tests_repo: &Path, updates: &[MappingUpdate]) -> HealResult<BulkUpdateReport> {
        let mut bulk = BulkUpdateReport::default();
        for update in updates {
            let report = self.update(tests_repo, update)?;
            bulk.total_updated += report.updated;
            bulk.changed_files
                .extend(report.changed_files().map(Path::to_path_buf));
            bulk.results.push(report);
        }
        Ok(bulk)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ANDROID_DOC: &str = "android:\n  - name: us.mappings.cart.checkout\n    identifier: //*[@resource-id='old_checkout']\n  - name: us.mappings.cart.total\n    identifier: //*[@resource-id='total']\n";
    const IOS_DOC: &str = "ios:\n  - name: us.mappings.cart.checkout\n    identifier: //*[@name='old_checkout']\n    timeout: 5\nandroid:\n  - name: us.mappings.cart.checkout\n    identifier: untouched-android\n";

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        for module in ["cart", "orders"] {
            let m = dir.path().join("us/e2e-tests/modules").join(module);
            std::fs::create_dir_all(&m).unwrap();
            std::fs::write(m.join("mappings-android.yaml"), ANDROID_DOC).unwrap();
            std::fs::write(m.join("mappings-ios.yaml"), IOS_DOC).unwrap();
        }
        dir
    }

    fn read_doc(dir: &TempDir, module: &str, file: &str) -> MappingDocument {
        let path = dir.path().join("us/e2e-tests/modules").join(module).join(file);
        MappingDocument::parse(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    mod document_tests {
        use super::*;

        #[test]
        fn test_set_identifier_only_on_matching_name() {
            let mut doc = MappingDocument::parse(ANDROID_DOC).unwrap();
            assert!(doc.set_identifier(Platform::Android, "us.mappings.cart.checkout", "new"));
            let records = doc.android.as_ref().unwrap();
            assert_eq!(records[0].identifier.as_deref(), Some("new"));
            assert_eq!(
                records[1].identifier.as_deref(),
                Some("//*[@resource-id='total']")
            );
        }

        #[test]
        fn test_equal_identifier_is_not_a_change() {
            let mut doc = MappingDocument::parse(ANDROID_DOC).unwrap();
            assert!(!doc.set_identifier(
                Platform::Android,
                "us.mappings.cart.total",
                "//*[@resource-id='total']"
            ));
        }

        #[test]
        fn test_extra_keys_survive_round_trip() {
            let mut doc = MappingDocument::parse(IOS_DOC).unwrap();
            doc.set_identifier(Platform::Ios, "us.mappings.cart.checkout", "x");
            let again = MappingDocument::parse(&doc.to_yaml().unwrap()).unwrap();
            let record = &again.ios.unwrap()[0];
            assert_eq!(record.identifier.as_deref(), Some("x"));
            assert!(record.extra.contains_key("timeout"));
        }

        #[test]
        fn test_tabs_are_normalized() {
            let doc = MappingDocument::parse("ios:\n\t- name: a\n\t  identifier: b\n").unwrap();
            assert_eq!(doc.ios.unwrap()[0].name.as_deref(), Some("a"));
        }

        #[test]
        fn test_file_name_rules() {
            assert_eq!(platform_from_filename("mappings-android.yaml"), Some(Platform::Android));
            assert_eq!(platform_from_filename("mappings-iOS-spanish.yaml"), Some(Platform::Ios));
            assert_eq!(platform_from_filename("other.yaml"), None);
            assert!(is_locale_file("mappings-ios-spanish.yaml"));
            assert!(!is_locale_file("mappings-android.yaml"));
        }
    }

    mod update_tests {
        use super::*;

        #[test]
        fn test_updates_every_module() {
            let dir = repo();
            let update = MappingUpdate::new("us.mappings.cart.checkout", "//*[@resource-id='checkout_now']", "//*[@name='checkout_now']");
            let report = MappingUpdater::default().update(dir.path(), &update).unwrap();
            assert_eq!(report.updated, 4);
            assert!(report.skipped_bad_yaml.is_empty());
            let doc = read_doc(&dir, "orders", "mappings-ios.yaml");
            assert_eq!(
                doc.ios.unwrap()[0].identifier.as_deref(),
                Some("//*[@name='checkout_now']")
            );
        }

        #[test]
        fn test_second_application_is_noop() {
            let dir = repo();
            let update = MappingUpdate::new("us.mappings.cart.checkout", "a-new", "i-new");
            let updater = MappingUpdater::default();
            assert!(updater.update(dir.path(), &update).unwrap().updated > 0);
            let again = updater.update(dir.path(), &update).unwrap();
            assert_eq!(again.updated, 0);
            assert!(again.files.iter().all(|f| !f.changed));
        }

        #[test]
        fn test_empty_android_id_leaves_android_entries_alone() {
            let dir = repo();
            let update = MappingUpdate::new("us.mappings.cart.checkout", "", "//*[@name='checkout_now']");
            let report = MappingUpdater::default().update(dir.path(), &update).unwrap();

            assert_eq!(report.updated, 2);
            assert!(report
                .files
                .iter()
                .all(|f| f.platform == Some(Platform::Ios)));
            let ios_doc = read_doc(&dir, "cart", "mappings-ios.yaml");
            assert_eq!(
                ios_doc.android.unwrap()[0].identifier.as_deref(),
                Some("untouched-android")
            );
            let android_path = dir.path().join("us/e2e-tests/modules/cart/mappings-android.yaml");
            assert_eq!(std::fs::read_to_string(android_path).unwrap(), ANDROID_DOC);
        }

        #[test]
        fn test_android_only_change_leaves_ios_identifier() {
            let dir = repo();
            let update = MappingUpdate::new("us.mappings.cart.checkout", "a-new", "");
            MappingUpdater::default().update(dir.path(), &update).unwrap();
            let ios_doc = read_doc(&dir, "cart", "mappings-ios.yaml");
            assert_eq!(
                ios_doc.ios.unwrap()[0].identifier.as_deref(),
                Some("//*[@name='old_checkout']")
            );
        }

        #[test]
        fn test_bad_yaml_is_isolated() {
            let dir = repo();
            let bad = dir.path().join("us/e2e-tests/modules/cart/mappings-android.yaml");
            std::fs::write(&bad, "android: [unclosed\n").unwrap();
            let update = MappingUpdate::new("us.mappings.cart.checkout", "a-new", "");
            let report = MappingUpdater::default().update(dir.path(), &update).unwrap();
            assert_eq!(report.skipped_bad_yaml.len(), 1);
            assert_eq!(report.skipped_bad_yaml[0].file, bad);
            assert_eq!(report.updated, 1);
        }

        #[test]
        fn test_missing_modules_root() {
            let dir = TempDir::new().unwrap();
            let update = MappingUpdate::new("x", "a", "i");
            let report = MappingUpdater::default().update(dir.path(), &update).unwrap();
            assert_eq!(report.updated, 0);
            assert!(report.message.unwrap().starts_with("Modules dir not found"));
        }

        #[test]
        fn test_locale_files_can_be_excluded() {
            let config = MappingsConfig {
                include_locale_files: false,
                ..MappingsConfig::default()
            };
            assert_eq!(MappingUpdater::from_config(&config).files().len(), 2);
        }

        #[test]
        fn test_update_many_aggregates() {
            let dir = repo();
            let updates = vec![
                MappingUpdate::new("us.mappings.cart.checkout", "a-new", ""),
                MappingUpdate::new("us.mappings.cart.total", "t-new", ""),
            ];
            let bulk = MappingUpdater::default().update_many(dir.path(), &updates).unwrap();
            assert_eq!(bulk.total_updated, 4);
            assert_eq!(bulk.changed_files.len(), 2);
            assert_eq!(bulk.results.len(), 2);
        }
    }
}
