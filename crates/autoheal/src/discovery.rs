//! Identifier discovery in application source.
//!
//! Scans React Native, iOS and Android sources for the identifiers tests
//! locate elements by, and synthesizes per-platform locator strings for them.

use glob::{MatchOptions, Pattern};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::SourceFilesConfig;
use crate::result::{HealError, HealResult};

/// Application flavour identifiers are discovered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPlatform {
    /// React Native (`testID` props)
    ReactNative,
    /// Native iOS (`accessibilityIdentifier`)
    IosNative,
    /// Native Android (resource ids, content descriptions)
    AndroidNative,
}

impl AppPlatform {
    /// Config/wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReactNative => "react_native",
            Self::IosNative => "ios_native",
            Self::AndroidNative => "android_native",
        }
    }

    /// Source extensions walked when no globs are configured
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::ReactNative => &["ts", "tsx", "js", "jsx"],
            Self::IosNative => &["swift", "m", "mm"],
            Self::AndroidNative => &["xml", "kt", "java"],
        }
    }

    /// Configured globs for this platform
    #[must_use]
    pub fn globs(self, sources: &SourceFilesConfig) -> &[String] {
        match self {
            Self::ReactNative => &sources.react_native,
            Self::IosNative => &sources.ios_native,
            Self::AndroidNative => &sources.android_native,
        }
    }

    /// Locators for an identifier as written in mapping files
    #[must_use]
    pub fn locators_for(self, identifier: &str) -> PlatformLocators {
        match self {
            Self::ReactNative => PlatformLocators {
                android: format!(
                    "//*[@content-desc='{identifier}'] | //*[@resource-id='{identifier}']"
                ),
                ios: format!("//*[@name='{identifier}']"),
            },
            Self::IosNative => PlatformLocators {
                android: String::new(),
                ios: format!("//*[@name='{identifier}']"),
            },
            Self::AndroidNative => PlatformLocators {
                android: if identifier.contains(':') {
                    format!("//*[@resource-id='{identifier}'] | //*[@content-desc='{identifier}']")
                } else {
                    format!("//*[@content-desc='{identifier}'] | //*[@resource-id='{identifier}']")
                },
                ios: String::new(),
            },
        }
    }

    /// Extract identifiers from one file's text
    #[must_use]
    pub fn extract(self, text: &str) -> Vec<String> {
        match self {
            Self::ReactNative => extract_testids(text).into_iter().collect(),
            Self::IosNative => extract_ios(text),
            Self::AndroidNative => extract_android(text),
        }
    }
}

impl fmt::Display for AppPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppPlatform {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "react_native" | "rn" => Ok(Self::ReactNative),
            "ios_native" | "ios" => Ok(Self::IosNative),
            "android_native" | "android" => Ok(Self::AndroidNative),
            other => Err(HealError::invalid_input(format!(
                "unknown app platform '{other}' (expected react_native, ios_native or android_native)"
            ))),
        }
    }
}

/// Android and iOS locator strings; empty means not applicable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLocators {
    /// Android locator
    pub android: String,
    /// iOS locator
    pub ios: String,
}

struct Patterns {
    testid_quoted: Regex,
    testid_backtick: Regex,
    ios_identifier: Regex,
    ios_settings_button: Regex,
    android_id: Regex,
    android_content_desc: Regex,
    android_qualified: Regex,
}

#[allow(clippy::expect_used)]
fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static pattern");
        Patterns {
            testid_quoted: re(r#"\btest(?:ID|Id|id)\s*[:=]\s*\{?\s*(?:"([^"\n]+)"|'([^'\n]+)')"#),
            testid_backtick: re(r"\btest(?:ID|Id|id)\s*[:=]\s*\{?\s*`([^`\n]+)`"),
            ios_identifier: re(r#"accessibilityIdentifier\s*=\s*["']([^"']+)["']"#),
            ios_settings_button: re(r"\b([A-Za-z0-9_]*SettingsButton[A-Za-z0-9_]*)\b"),
            android_id: re(r"@\+?id/([A-Za-z0-9_.]+)"),
            android_content_desc: re(r#"contentDescription\s*=\s*["']([^"']+)["']"#),
            android_qualified: re(r"\b([a-z][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)+):id/([A-Za-z0-9_.]+)"),
        }
    })
}

/// React Native `testID` values, sorted and unique
#[must_use]
pub fn extract_testids(text: &str) -> BTreeSet<String> {
    let p = patterns();
    let quoted = p
        .testid_quoted
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)));
    let backticked = p
        .testid_backtick
        .captures_iter(text)
        .filter_map(|c| c.get(1));
    quoted
        .chain(backticked)
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

/// iOS accessibility identifiers and `*SettingsButton*` names, first-seen order
#[must_use]
pub fn extract_ios(text: &str) -> Vec<String> {
    let p = patterns();
    let mut out = Vec::new();
    for c in p.ios_identifier.captures_iter(text) {
        push_unique(&mut out, c[1].to_string());
    }
    for c in p.ios_settings_button.captures_iter(text) {
        push_unique(&mut out, c[1].to_string());
    }
    out
}

/// Android resource ids, content descriptions and package-qualified ids,
/// first-seen order
#[must_use]
pub fn extract_android(text: &str) -> Vec<String> {
    let p = patterns();
    let mut out = Vec::new();
    for c in p.android_id.captures_iter(text) {
        push_unique(&mut out, c[1].to_string());
    }
    for c in p.android_content_desc.captures_iter(text) {
        push_unique(&mut out, c[1].to_string());
    }
    for c in p.android_qualified.captures_iter(text) {
        push_unique(&mut out, format!("{}:id/{}", &c[1], &c[2]));
    }
    out
}

fn glob_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Regular files under `root` matching `pattern` (relative, `/`-separated),
/// sorted. Hidden files and directories are skipped.
pub fn glob_files(root: &Path, pattern: &str) -> HealResult<Vec<PathBuf>> {
    let full = format!(
        "{}/{}",
        Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches("./")
    );
    let paths = glob::glob_with(&full, glob_options()).map_err(|e| HealError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    let mut out: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable path");
                None
            }
        })
        .filter(|p| p.is_file() && !is_hidden(root, p))
        .collect();
    out.sort();
    out.dedup();
    Ok(out)
}

/// Every regular file under `root`, sorted; hidden entries are skipped
#[must_use]
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    glob_files(root, "**/*").unwrap_or_default()
}

/// Source files for a platform: configured globs, else a walk by extension
pub fn source_files(
    app_repo: &Path,
    platform: AppPlatform,
    sources: &SourceFilesConfig,
) -> HealResult<Vec<PathBuf>> {
    let globs = platform.globs(sources);
    if !globs.is_empty() {
        let mut matched = Vec::new();
        for g in globs {
            matched.extend(glob_files(app_repo, g)?);
        }
        matched.sort();
        matched.dedup();
        if !matched.is_empty() {
            return Ok(matched);
        }
        warn!(platform = %platform, "Configured source globs matched nothing, scanning by extension");
    }
    let exts = platform.extensions();
    Ok(walk_files(app_repo)
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| exts.contains(&e))
        })
        .collect())
}

/// Discover identifiers in an application repository.
///
/// React Native results are sorted; native results keep first-seen order.
pub fn discover(
    app_repo: &Path,
    platform: AppPlatform,
    sources: &SourceFilesConfig,
) -> HealResult<Vec<String>> {
    let files = source_files(app_repo, platform, sources)?;
    debug!(platform = %platform, files = files.len(), "Scanning app sources");
    let mut found = Vec::new();
    for file in &files {
        let Ok(bytes) = std::fs::read(file) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);
        for id in platform.extract(&text) {
            push_unique(&mut found, id);
        }
    }
    if platform == AppPlatform::ReactNative {
        found.sort();
    }
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod extract_tests {
        use super::*;

        #[test]
        fn test_react_native_forms() {
            let src = r#"
<Button testID="checkout_button" />
<View testId='cart_list' />
<Text testID={"product_sku_cap"} />
<Pressable testID={`product_sku_hoodie`} />
const props = { testID: "checkout_button" };
"#;
            let ids: Vec<_> = extract_testids(src).into_iter().collect();
            assert_eq!(
                ids,
                vec!["cart_list", "checkout_button", "product_sku_cap", "product_sku_hoodie"]
            );
        }

        #[test]
        fn test_ios_identifiers_keep_first_seen_order() {
            let src = r#"
payButton.accessibilityIdentifier = "pay_now"
cartButton.accessibilityIdentifier = 'cart'
let profileSettingsButton = UIButton()
payButton.accessibilityIdentifier = "pay_now"
"#;
            assert_eq!(
                extract_ios(src),
                vec!["pay_now", "cart", "profileSettingsButton"]
            );
        }

        #[test]
        fn test_android_identifiers() {
            let src = r#"
<Button android:id="@+id/checkout" android:contentDescription="Checkout"/>
<View android:id="@id/cart_list"/>
val id = "com.shop.app.debug:id/promo_banner"
view.contentDescription = "Promo"
"#;
            assert_eq!(
                extract_android(src),
                vec![
                    "checkout",
                    "cart_list",
                    "Checkout",
                    "Promo",
                    "com.shop.app.debug:id/promo_banner"
                ]
            );
        }
    }

    mod locator_tests {
        use super::*;

        #[test]
        fn test_react_native_locators_cover_both_platforms() {
            let l = AppPlatform::ReactNative.locators_for("checkout_button");
            assert_eq!(
                l.android,
                "//*[@content-desc='checkout_button'] | //*[@resource-id='checkout_button']"
            );
            assert_eq!(l.ios, "//*[@name='checkout_button']");
        }

        #[test]
        fn test_native_locators_are_single_platform() {
            assert!(AppPlatform::IosNative.locators_for("x").android.is_empty());
            let a = AppPlatform::AndroidNative.locators_for("pkg.app:id/x");
            assert!(a.android.starts_with("//*[@resource-id="));
            assert!(a.ios.is_empty());
        }

        #[test]
        fn test_parse_app_platform() {
            assert_eq!(
                "react_native".parse::<AppPlatform>().unwrap(),
                AppPlatform::ReactNative
            );
            assert!("flutter".parse::<AppPlatform>().is_err());
        }
    }

    mod glob_tests {
        use super::*;

        fn touch(dir: &Path, rel: &str) {
            let path = dir.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }

        fn rel(dir: &TempDir, paths: Vec<PathBuf>) -> Vec<String> {
            paths
                .iter()
                .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
                .collect()
        }

        #[test]
        fn test_double_star_matches_any_depth() {
            let dir = TempDir::new().unwrap();
            for f in ["src/App.tsx", "src/screens/cart/Cart.tsx", "lib/App.tsx", "src/App.ts"] {
                touch(dir.path(), f);
            }
            let found = glob_files(dir.path(), "src/**/*.tsx").unwrap();
            assert_eq!(rel(&dir, found), vec!["src/App.tsx", "src/screens/cart/Cart.tsx"]);
        }

        #[test]
        fn test_single_star_stays_in_segment() {
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "ios/Cart.swift");
            touch(dir.path(), "ios/views/Cart.swift");
            let found = glob_files(dir.path(), "ios/*.swift").unwrap();
            assert_eq!(rel(&dir, found), vec!["ios/Cart.swift"]);
        }

        #[test]
        fn test_character_classes_keep_glob_meaning() {
            let dir = TempDir::new().unwrap();
            for f in ["res/layout-a.xml", "res/layout-b.xml", "res/layout-c.xml"] {
                touch(dir.path(), f);
            }
            let found = glob_files(dir.path(), "res/layout-[ab].xml").unwrap();
            assert_eq!(rel(&dir, found), vec!["res/layout-a.xml", "res/layout-b.xml"]);
        }

        #[test]
        fn test_walk_skips_hidden_entries() {
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "src/App.tsx");
            touch(dir.path(), ".git/config");
            touch(dir.path(), "src/.cache/x.tsx");
            assert_eq!(rel(&dir, walk_files(dir.path())), vec!["src/App.tsx"]);
        }

        #[test]
        fn test_invalid_glob_is_a_pattern_error() {
            let dir = TempDir::new().unwrap();
            let err = glob_files(dir.path(), "src/[.tsx").unwrap_err();
            assert!(matches!(err, HealError::Pattern { .. }));
        }
    }

    mod discover_tests {
        use super::*;

        fn write(dir: &Path, rel: &str, text: &str) {
            let path = dir.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }

        #[test]
        fn test_walk_by_extension_when_unconfigured() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "src/Cart.tsx", r#"<B testID="b_checkout"/>"#);
            write(dir.path(), "src/deep/List.js", r#"<L testID="a_list"/>"#);
            write(dir.path(), "README.md", r#"testID="ignored""#);
            write(dir.path(), ".git/x.js", r#"testID="hidden""#);
            let ids = discover(
                dir.path(),
                AppPlatform::ReactNative,
                &SourceFilesConfig::default(),
            )
            .unwrap();
            assert_eq!(ids, vec!["a_list", "b_checkout"]);
        }

        #[test]
        fn test_configured_globs_restrict_files() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "ios/Cart.swift", r#"b.accessibilityIdentifier = "cart""#);
            write(dir.path(), "ios/Old.swift", r#"b.accessibilityIdentifier = "old""#);
            let sources = SourceFilesConfig {
                ios_native: vec!["ios/Cart.swift".to_string()],
                ..SourceFilesConfig::default()
            };
            let ids = discover(dir.path(), AppPlatform::IosNative, &sources).unwrap();
            assert_eq!(ids, vec!["cart"]);
        }

        #[test]
        fn test_missing_repo_yields_nothing() {
            let ids = discover(
                Path::new("/nonexistent/app"),
                AppPlatform::AndroidNative,
                &SourceFilesConfig::default(),
            )
            .unwrap();
            assert!(ids.is_empty());
        }
    }
}
