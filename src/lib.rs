//! PPE Overlay Pipeline
//!
//! Samples frames from a live source, sends each one to an object detector for
//! personal protective equipment, and draws the detections over the frame with
//! violations and compliant equipment in distinct colors.
//!
//! # Architecture
//!
//! Detection is slower than the display rate, so rounds overlap:
//!
//! 1. **Non-blocking dispatch**: every redraw captures a frame and dispatches it;
//!    no redraw waits on the detector.
//! 2. **Ordered display**: a result is shown only if its request id is higher than
//!    every id shown before it. Late results are dropped.
//! 3. **Single writer**: results are applied on the host's thread inside
//!    `Pipeline::step`, never from detection workers.
//! 4. **Clean stop**: stopping releases the source at once and leaves in-flight
//!    rounds with nowhere to report.
//!
//! # Module Structure
//!
//! - `frame`: captured frames (`FrameSample`)
//! - `ingest`: live frame sources (synthetic, local stills)
//! - `detect`: detector backends, the detection client and the confidence filter
//! - `classify`: violation vs. compliant labels
//! - `overlay`: drawing surfaces and the overlay renderer
//! - `stats`: per-round counts and the headline
//! - `pipeline`: the frame-sampling state machine
//! - `config`: file + env configuration for the viewer

pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod stats;

pub use classify::{classify, Classification, Classifier, ViolationRule};
pub use config::{DetectorKind, ViewerConfig};
pub use detect::{
    filter_by_confidence, BackendRegistry, BoundingBox, Completion, Detection, DetectionClient,
    DetectorBackend, SyntheticBackend,
};
#[cfg(feature = "detect-http")]
pub use detect::{HttpBackend, HttpBackendConfig};
pub use error::{AcquisitionError, DetectionError, RenderError};
pub use frame::FrameSample;
pub use ingest::{open_source, FrameSource, LiveVideoHandle};
pub use overlay::{ImageSurface, OverlayRenderer, OverlayStyle, Rect, Surface};
pub use pipeline::{
    run, IntervalScheduler, Pipeline, PipelineCounters, PipelinePhase, PipelineSettings,
    RedrawScheduler, StepReport,
};
pub use stats::{aggregate, StatsSnapshot};
