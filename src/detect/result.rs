use serde::Serialize;

use crate::error::DetectionError;

/// Axis-aligned box in frame pixel coordinates. Always `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, DetectionError> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(DetectionError::MalformedResponse(format!(
                "non-finite box coordinates ({x1}, {y1}, {x2}, {y2})"
            )));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(DetectionError::MalformedResponse(format!(
                "degenerate box ({x1}, {y1}, {x2}, {y2})"
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// One detected object for one frame. Produced fresh per round.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(
        label: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
    ) -> Result<Self, DetectionError> {
        let label = label.into();
        if label.is_empty() {
            return Err(DetectionError::MalformedResponse("empty label".into()));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DetectionError::MalformedResponse(format!(
                "confidence {confidence} outside [0, 1] for '{label}'"
            )));
        }
        Ok(Self {
            label,
            confidence,
            bbox,
        })
    }

    /// `"<label> <round(confidence*100)>%"`
    pub fn caption(&self) -> String {
        format!("{} {}%", self.label, (self.confidence * 100.0).round() as u32)
    }
}
