//! Error taxonomy for the overlay pipeline.
//!
//! - `AcquisitionError`: the frame source could not be opened. Fatal to `start`,
//!   recoverable by starting again.
//! - `DetectionError`: one detection round failed. Never fatal; the loop keeps
//!   sampling and the last good overlay/stats stay on screen.
//! - `RenderError`: drawing a round failed. Only that round's overlay is skipped.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquisitionError {
    /// The source exists but refused access (permissions, busy device).
    #[error("failed to access camera: {0}")]
    Denied(String),
    /// Nothing to acquire at the configured location.
    #[error("no frame source available: {0}")]
    Unavailable(String),
    /// The source opened but never produced a first frame.
    #[error("frame source never became ready: {0}")]
    NotReady(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectionError {
    /// Service unreachable or answered with a non-2xx status.
    #[error("detection service unreachable: {0}")]
    Network(String),
    /// Service answered, but the payload is missing or has invalid fields.
    #[error("malformed detection response: {0}")]
    MalformedResponse(String),
    /// The service reported that it could not process the frame.
    #[error("detection service error: {0}")]
    Service(String),
    #[error("detection timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl DetectionError {
    /// Short tag for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionError::Network(_) => "network",
            DetectionError::MalformedResponse(_) => "malformed",
            DetectionError::Service(_) => "service",
            DetectionError::Timeout(_) => "timeout",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("surface is {surface_w}x{surface_h} but frame is {frame_w}x{frame_h}")]
    SizeMismatch {
        surface_w: u32,
        surface_h: u32,
        frame_w: u32,
        frame_h: u32,
    },
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BadFrameBuffer { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = AcquisitionError::Denied("permission denied".into());
        assert_eq!(err.to_string(), "failed to access camera: permission denied");

        let err = DetectionError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "detection timed out after 1500ms");
        assert_eq!(err.kind(), "timeout");
    }
}
