use serde::Serialize;

use crate::classify::{Classification, Classifier};
use crate::detect::Detection;

/// Counts for the most recently applied detection round.
///
/// Replaced wholesale each round; `violations + compliant == total` always.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: usize,
    pub violations: usize,
    pub compliant: usize,
}

impl StatsSnapshot {
    pub fn has_violations(&self) -> bool {
        self.violations > 0
    }

    /// Status line for the viewer.
    pub fn headline(&self) -> &'static str {
        if self.has_violations() {
            "Safety Violations Detected"
        } else {
            "All Safety Equipment Present"
        }
    }
}

/// Reduce a filtered detection list into counts.
pub fn aggregate(classifier: &Classifier, detections: &[Detection]) -> StatsSnapshot {
    let violations = detections
        .iter()
        .filter(|det| classifier.classify(&det.label) == Classification::Violation)
        .count();
    StatsSnapshot {
        total: detections.len(),
        violations,
        compliant: detections.len() - violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ViolationRule;
    use crate::detect::BoundingBox;

    fn det(label: &str) -> Detection {
        let bbox = BoundingBox::new(1.0, 1.0, 2.0, 2.0).unwrap();
        Detection::new(label, 0.9, bbox).unwrap()
    }

    #[test]
    fn partitions_sum_to_total() {
        let classifier = Classifier::default();
        let vocab = ["NO-Hardhat", "Hardhat", "NO-Mask", "Person", "Safety Cone"];
        for n in 0..12 {
            let list: Vec<_> = (0..n).map(|i| det(vocab[i % vocab.len()])).collect();
            let stats = aggregate(&classifier, &list);
            assert_eq!(stats.total, list.len());
            assert_eq!(stats.violations + stats.compliant, stats.total);
        }
    }

    #[test]
    fn counts_with_configured_rule() {
        let list = vec![det("NO-Hardhat"), det("MISSING_vest"), det("Person")];
        let stats = aggregate(&Classifier::default(), &list);
        assert_eq!(
            stats,
            StatsSnapshot {
                total: 3,
                violations: 1,
                compliant: 2
            }
        );

        let custom = Classifier::new(ViolationRule::pattern("^(NO-|MISSING_)").unwrap());
        assert_eq!(aggregate(&custom, &list).violations, 2);
    }

    #[test]
    fn empty_round_is_all_zero() {
        let stats = aggregate(&Classifier::default(), &[]);
        assert_eq!(stats, StatsSnapshot::default());
        assert_eq!(stats.headline(), "All Safety Equipment Present");
    }
}
