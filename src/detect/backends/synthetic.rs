use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::DetectionError;
use crate::frame::FrameSample;

/// PPE vocabulary of the stock safety model. The two lowercase `NO-` labels are
/// spelled the way the model emits them.
pub const PPE_LABELS: [&str; 8] = [
    "Hardhat",
    "Mask",
    "NO-hardhat",
    "NO-mask",
    "NO-Safety Vest",
    "Person",
    "Safety Cone",
    "Safety Vest",
];

const MIN_BOX_SIDE: u32 = 50;
const MAX_BOX_EXTRA: u32 = 150;
const EDGE_MARGIN: u32 = 100;

/// Local stand-in for a detection service.
///
/// Emits 1 to 5 PPE detections per frame. The generator is seeded from a hash of
/// the frame pixels, so the same frame always yields the same detections.
pub struct SyntheticBackend {
    salt: u64,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self { salt: 0 }
    }

    /// Mix a salt into the seed to get a different (still deterministic) stream.
    pub fn with_salt(salt: u64) -> Self {
        Self { salt }
    }

    fn seed_for(&self, frame: &FrameSample) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(frame.width.to_le_bytes());
        hasher.update(frame.height.to_le_bytes());
        hasher.update(frame.as_bytes());
        hasher.update(self.salt.to_le_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(seed)
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn detect(&self, frame: &FrameSample) -> Result<Vec<Detection>, DetectionError> {
        if frame.width < 2 || frame.height < 2 {
            return Ok(Vec::new());
        }
        let mut rng = StdRng::seed_from_u64(self.seed_for(frame));
        let count = rng.gen_range(1..=5);
        let mut detections = Vec::with_capacity(count);

        for _ in 0..count {
            let label = PPE_LABELS[rng.gen_range(0..PPE_LABELS.len())];

            let x_span = frame.width.saturating_sub(EDGE_MARGIN).max(1);
            let y_span = frame.height.saturating_sub(EDGE_MARGIN).max(1);
            let x1 = rng.gen_range(0..x_span).min(frame.width - 2);
            let y1 = rng.gen_range(0..y_span).min(frame.height - 2);
            let box_w = rng.gen_range(0..MAX_BOX_EXTRA) + MIN_BOX_SIDE;
            let box_h = rng.gen_range(0..MAX_BOX_EXTRA) + MIN_BOX_SIDE;
            let x2 = (x1 + box_w).min(frame.width);
            let y2 = (y1 + box_h).min(frame.height);

            let confidence = rng.gen_range(0.5f32..1.0);
            let bbox = BoundingBox::new(x1 as f32, y1 as f32, x2 as f32, y2 as f32)?;
            detections.push(Detection::new(label, confidence, bbox)?);
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_frame_yields_same_detections() {
        let backend = SyntheticBackend::new();
        let frame = FrameSample::filled(640, 480, [40, 80, 120]);
        let first = backend.detect(&frame).unwrap();
        let second = backend.detect(&frame).unwrap();
        assert_eq!(first, second);
        assert!((1..=5).contains(&first.len()));
    }

    #[test]
    fn detections_stay_inside_frame_and_vocabulary() {
        let backend = SyntheticBackend::with_salt(7);
        for shade in 0..20u8 {
            let frame = FrameSample::filled(320, 240, [shade, shade, shade]);
            for det in backend.detect(&frame).unwrap() {
                assert!(PPE_LABELS.contains(&det.label.as_str()));
                assert!((0.5..1.0).contains(&det.confidence));
                assert!(det.bbox.x1 >= 0.0 && det.bbox.x2 <= 320.0);
                assert!(det.bbox.y1 >= 0.0 && det.bbox.y2 <= 240.0);
            }
        }
    }

    #[test]
    fn tiny_frames_still_produce_valid_boxes() {
        let backend = SyntheticBackend::new();
        let frame = FrameSample::filled(40, 30, [0, 0, 0]);
        for det in backend.detect(&frame).unwrap() {
            assert!(det.bbox.x1 < det.bbox.x2);
            assert!(det.bbox.y1 < det.bbox.y2);
        }
        let degenerate = FrameSample::filled(1, 1, [0, 0, 0]);
        assert!(backend.detect(&degenerate).unwrap().is_empty());
    }
}
