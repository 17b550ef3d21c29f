use crate::detect::result::Detection;

/// Drop every detection below `threshold`, keeping the survivors in order.
///
/// A detection exactly at the threshold survives.
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|det| det.confidence >= threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, confidence: f32) -> Detection {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        Detection::new(label, confidence, bbox).unwrap()
    }

    #[test]
    fn drops_low_confidence_and_preserves_order() {
        let input = vec![
            det("NO-Hardhat", 0.9),
            det("Safety Vest", 0.4),
            det("Person", 0.5),
            det("Mask", 0.49),
            det("Hardhat", 0.7),
        ];
        let labels: Vec<_> = filter_by_confidence(input, 0.5)
            .into_iter()
            .map(|d| d.label)
            .collect();
        assert_eq!(labels, vec!["NO-Hardhat", "Person", "Hardhat"]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let input = vec![det("A", 0.2), det("B", 0.8), det("C", 0.6), det("D", 0.55)];
        for threshold in [0.0, 0.3, 0.5, 0.6, 0.9, 1.0] {
            let once = filter_by_confidence(input.clone(), threshold);
            let twice = filter_by_confidence(once.clone(), threshold);
            assert_eq!(once, twice, "threshold {threshold}");
        }
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(filter_by_confidence(Vec::new(), 0.5).is_empty());
    }
}
