use crate::detect::result::Detection;
use crate::error::DetectionError;
use crate::frame::FrameSample;

/// A detection service: given one frame, returns every object it found.
///
/// Implementations return raw results. Confidence filtering and classification
/// happen in the pipeline, never here. `detect` takes `&self` because several
/// rounds may be in flight against the same backend at once; a backend must not
/// mutate state shared with the pipeline.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Blocks the calling worker until the service answers or the backend's own
    /// bounded wait expires.
    fn detect(&self, frame: &FrameSample) -> Result<Vec<Detection>, DetectionError>;
}
