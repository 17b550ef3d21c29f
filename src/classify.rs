//! Compliance classification of detection labels.
//!
//! The label vocabulary belongs to the detection service and grows over time, so
//! what counts as a violation is a rule, not a list. The stock rule is the
//! absence-of-equipment naming convention: any label starting with `NO-`
//! (case-sensitive) is a violation.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;

/// Stock prefix marking absence of required equipment.
pub const DEFAULT_VIOLATION_PREFIX: &str = "NO-";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    Compliant,
    Violation,
}

impl Classification {
    pub fn is_violation(self) -> bool {
        matches!(self, Classification::Violation)
    }
}

type LabelPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Rule deciding whether a label denotes a violation.
#[derive(Clone)]
pub enum ViolationRule {
    Prefix(String),
    Pattern(Regex),
    Predicate(LabelPredicate),
}

impl ViolationRule {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        ViolationRule::Prefix(prefix.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .with_context(|| format!("invalid violation pattern '{pattern}'"))?;
        Ok(ViolationRule::Pattern(re))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        ViolationRule::Predicate(Arc::new(f))
    }

    fn matches(&self, label: &str) -> bool {
        match self {
            ViolationRule::Prefix(prefix) => label.starts_with(prefix.as_str()),
            ViolationRule::Pattern(re) => re.is_match(label),
            ViolationRule::Predicate(f) => f(label),
        }
    }
}

impl Default for ViolationRule {
    fn default() -> Self {
        ViolationRule::Prefix(DEFAULT_VIOLATION_PREFIX.to_string())
    }
}

impl fmt::Debug for ViolationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationRule::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            ViolationRule::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            ViolationRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Maps labels to `Compliant` / `Violation`.
#[derive(Clone, Debug, Default)]
pub struct Classifier {
    rule: ViolationRule,
}

impl Classifier {
    pub fn new(rule: ViolationRule) -> Self {
        Self { rule }
    }

    pub fn classify(&self, label: &str) -> Classification {
        if self.rule.matches(label) {
            Classification::Violation
        } else {
            Classification::Compliant
        }
    }
}

/// Classify with the stock `NO-` prefix rule.
pub fn classify(label: &str) -> Classification {
    if label.starts_with(DEFAULT_VIOLATION_PREFIX) {
        Classification::Violation
    } else {
        Classification::Compliant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_rule_follows_no_prefix() {
        let classifier = Classifier::default();
        for (label, expected) in [
            ("NO-Hardhat", Classification::Violation),
            ("Hardhat", Classification::Compliant),
            ("NO-Safety Vest", Classification::Violation),
            ("Person", Classification::Compliant),
        ] {
            assert_eq!(classifier.classify(label), expected, "{label}");
            assert_eq!(classify(label), expected, "{label}");
        }
    }

    #[test]
    fn prefix_is_case_sensitive() {
        assert_eq!(classify("no-Hardhat"), Classification::Compliant);
        assert_eq!(classify("No-Mask"), Classification::Compliant);
        assert_eq!(classify("NO"), Classification::Compliant);
        assert_eq!(classify("NO-"), Classification::Violation);
    }

    #[test]
    fn pattern_and_predicate_rules() {
        let classifier = Classifier::new(ViolationRule::pattern(r"^(NO-|MISSING_)").unwrap());
        assert!(classifier.classify("MISSING_gloves").is_violation());
        assert!(classifier.classify("NO-Mask").is_violation());
        assert!(!classifier.classify("Gloves").is_violation());

        let classifier = Classifier::new(ViolationRule::predicate(|label| label.ends_with("-absent")));
        assert!(classifier.classify("vest-absent").is_violation());
        assert!(!classifier.classify("NO-Hardhat").is_violation());

        assert!(ViolationRule::pattern("(").is_err());
    }
}
