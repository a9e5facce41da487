//! Accessibility-tree heuristic for iOS tests.

use regex::Regex;
use roxmltree::{Document, Node};

use super::ProposalStrategy;
use crate::model::{IosLocatorStrategy, LocatorCandidate, LocatorValue, StrategyTag};

/// Picks a replacement button from an XCUITest accessibility-tree dump.
///
/// Labels are compared case-insensitively with whitespace removed, so a
/// `"Check Out"` button renamed to `"Checkout Now"` is still recognised.
#[derive(Debug, Clone)]
pub struct IosHeuristic {
    prefer_accessibility: bool,
    label_predicate: Regex,
}

impl Default for IosHeuristic {
    fn default() -> Self {
        Self::new(true)
    }
}

impl IosHeuristic {
    /// Create the heuristic
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(prefer_accessibility: bool) -> Self {
        Self {
            prefer_accessibility,
            label_predicate: Regex::new(r#"label[^"]*"([^"]*)""#).expect("static pattern"),
        }
    }

    /// Label the old locator pointed at.
    ///
    /// `label == "Check Out"` yields `Check Out`; a bare string is the label.
    #[must_use]
    pub fn target_label<'a>(&self, old_locator: &'a str) -> &'a str {
        self.label_predicate
            .captures(old_locator)
            .and_then(|c| c.get(1))
            .map_or(old_locator, |m| m.as_str())
    }
}

fn is_button(node: &Node<'_, '_>) -> bool {
    node.is_element()
        && node
            .attribute("type")
            .is_some_and(|t| t.ends_with("Button"))
}

fn label_of<'a>(node: &Node<'a, '_>) -> Option<&'a str> {
    node.attribute("label").filter(|l| !l.is_empty())
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Unique non-empty button labels in document order
#[must_use]
pub fn button_labels<'a>(doc: &'a Document<'_>) -> Vec<&'a str> {
    let mut labels: Vec<&str> = Vec::new();
    for node in doc.descendants().filter(is_button) {
        if let Some(label) = label_of(&node) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
    }
    labels
}

fn accessibility_id<'a>(node: &Node<'a, '_>) -> Option<&'a str> {
    node.attribute("name")
        .filter(|v| !v.is_empty())
        .or_else(|| node.attribute("accessibilityIdentifier").filter(|v| !v.is_empty()))
}

impl ProposalStrategy for IosHeuristic {
    fn name(&self) -> &'static str {
        "ios_heuristic"
    }

    fn propose(&self, old_locator: &str, snapshot: &str) -> Option<LocatorCandidate> {
        let doc = Document::parse(snapshot).ok()?;
        let target = self.target_label(old_locator);
        let wanted = squash(target);

        let labels = button_labels(&doc);
        let chosen = labels
            .iter()
            .copied()
            .find(|l| *l != target && squash(l).contains(&wanted))
            .or_else(|| labels.first().copied())?;

        if self.prefer_accessibility {
            let node = doc
                .descendants()
                .find(|n| is_button(n) && n.attribute("label") == Some(chosen));
            if let Some(acc_id) = node.as_ref().and_then(accessibility_id) {
                return Some(LocatorCandidate::new(
                    StrategyTag::IosAccessibilityId,
                    LocatorValue::Ios {
                        strategy: IosLocatorStrategy::AccessibilityId,
                        value: acc_id.to_string(),
                    },
                    format!("Preferred accessibility id \"{acc_id}\" on button labeled \"{chosen}\"."),
                ));
            }
        }

        Some(LocatorCandidate::new(
            StrategyTag::IosPredicate,
            LocatorValue::Ios {
                strategy: IosLocatorStrategy::IosPredicate,
                value: format!("label == \"{chosen}\""),
            },
            format!("Updated label from \"{target}\" to \"{chosen}\"."),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const CART_TREE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<XCUIElementTypeApplication type="XCUIElementTypeApplication" name="Shop">
  <XCUIElementTypeWindow type="XCUIElementTypeWindow">
    <XCUIElementTypeStaticText type="XCUIElementTypeStaticText" label="Your cart"/>
    <XCUIElementTypeButton type="XCUIElementTypeButton" label="Check Out"/>
    <XCUIElementTypeButton type="XCUIElementTypeButton" label="Checkout Now" name="checkout_now"/>
    <XCUIElementTypeButton type="XCUIElementTypeButton" label="Checkout Now" name="duplicate"/>
  </XCUIElementTypeWindow>
</XCUIElementTypeApplication>"#;

    fn value_of(c: &LocatorCandidate) -> (&IosLocatorStrategy, &str) {
        match &c.value {
            LocatorValue::Ios { strategy, value } => (strategy, value.as_str()),
            other => panic!("unexpected value {other:?}"),
        }
    }

    mod label_tests {
        use super::*;

        #[test]
        fn test_target_label_from_predicate() {
            let h = IosHeuristic::default();
            assert_eq!(h.target_label(r#"label == "Check Out""#), "Check Out");
            assert_eq!(h.target_label(r#"label="Pay""#), "Pay");
        }

        #[test]
        fn test_bare_string_is_label() {
            assert_eq!(IosHeuristic::default().target_label("Check Out"), "Check Out");
        }

        #[test]
        fn test_button_labels_are_unique_in_document_order() {
            let doc = Document::parse(CART_TREE).unwrap();
            assert_eq!(button_labels(&doc), vec!["Check Out", "Checkout Now"]);
        }
    }

    mod propose_tests {
        use super::*;

        #[test]
        fn test_renamed_button_prefers_accessibility_id() {
            let c = IosHeuristic::new(true)
                .propose(r#"label == "Check Out""#, CART_TREE)
                .unwrap();
            assert_eq!(c.strategy, StrategyTag::IosAccessibilityId);
            let (strategy, value) = value_of(&c);
            assert_eq!(*strategy, IosLocatorStrategy::AccessibilityId);
            assert_eq!(value, "checkout_now");
            assert!(c.rationale.contains("Checkout Now"));
        }

        #[test]
        fn test_predicate_when_accessibility_not_preferred() {
            let c = IosHeuristic::new(false)
                .propose(r#"label == "Check Out""#, CART_TREE)
                .unwrap();
            assert_eq!(c.strategy, StrategyTag::IosPredicate);
            assert_eq!(value_of(&c).1, r#"label == "Checkout Now""#);
        }

        #[test]
        fn test_predicate_when_node_has_no_identifier() {
            let xml = r#"<App><B type="XCUIElementTypeButton" label="Pay Now"/></App>"#;
            let c = IosHeuristic::new(true).propose("Pay", xml).unwrap();
            assert_eq!(c.strategy, StrategyTag::IosPredicate);
            assert_eq!(value_of(&c).1, r#"label == "Pay Now""#);
        }

        #[test]
        fn test_accessibility_identifier_attribute_is_used() {
            let xml = r#"<App><B type="XCUIElementTypeButton" label="Pay Now" accessibilityIdentifier="pay_now"/></App>"#;
            let c = IosHeuristic::new(true).propose("Pay", xml).unwrap();
            assert_eq!(value_of(&c).1, "pay_now");
        }

        #[test]
        fn test_falls_back_to_first_label() {
            let xml = r#"<App><B type="XCUIElementTypeButton" label="Settings"/><B type="XCUIElementTypeButton" label="Help"/></App>"#;
            let c = IosHeuristic::new(false).propose("Check Out", xml).unwrap();
            assert_eq!(value_of(&c).1, r#"label == "Settings""#);
        }

        #[test]
        fn test_unchanged_first_label_is_kept() {
            let xml = r#"<App><B type="XCUIElementTypeButton" label="Check Out"/><B type="XCUIElementTypeButton" label="Help"/></App>"#;
            let c = IosHeuristic::new(false)
                .propose(r#"label == "Check Out""#, xml)
                .unwrap();
            assert_eq!(value_of(&c).1, r#"label == "Check Out""#);
        }

        #[test]
        fn test_unparseable_snapshot_yields_none() {
            assert!(IosHeuristic::default().propose("Check Out", "<App><B").is_none());
        }

        #[test]
        fn test_no_buttons_yields_none() {
            let xml = r#"<App><T type="XCUIElementTypeStaticText" label="Hello"/></App>"#;
            assert!(IosHeuristic::default().propose("Hello", xml).is_none());
        }
    }
}
