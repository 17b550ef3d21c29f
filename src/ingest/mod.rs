//! Live frame sources.
//!
//! The pipeline needs only three things from a source: acquire a live handle,
//! read the current frame through it, and release it. Sources provided here:
//! - `stub://<name>`: synthetic moving scene (tests, demos)
//! - a local image file or a directory of images, looped as a live feed
//!
//! Sources MUST release their underlying device or file handles synchronously in
//! `release`, and MUST NOT hand out frames through a handle after release.

mod still;
mod synthetic;

use std::sync::atomic::{AtomicU64, Ordering};

pub use still::{StillConfig, StillSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use crate::error::AcquisitionError;
use crate::frame::FrameSample;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Proof of an acquired live source. Consumed by `FrameSource::release`.
#[derive(Debug, PartialEq, Eq)]
pub struct LiveVideoHandle {
    id: u64,
    source: String,
}

impl LiveVideoHandle {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            source: source.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A live visual frame source.
pub trait FrameSource: Send {
    /// Human-readable name for logs.
    fn describe(&self) -> String;

    /// Open the source. Failure text is shown to the viewer as-is.
    fn acquire(&mut self) -> Result<LiveVideoHandle, AcquisitionError>;

    /// True once the first frame is available.
    fn is_ready(&self, _handle: &LiveVideoHandle) -> bool {
        true
    }

    /// Native frame dimensions, once known.
    fn dimensions(&self, handle: &LiveVideoHandle) -> Option<(u32, u32)>;

    /// Capture the current frame. `None` when no frame is available right now.
    fn current_frame(&mut self, handle: &LiveVideoHandle) -> Option<FrameSample>;

    /// Release the source's underlying resources.
    fn release(&mut self, handle: LiveVideoHandle);
}

/// Build a source from a URI: `stub://...` or a local path.
pub fn open_source(uri: &str, width: u32, height: u32) -> Result<Box<dyn FrameSource>, AcquisitionError> {
    if uri.trim().is_empty() {
        return Err(AcquisitionError::Unavailable("empty source".into()));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            url: uri.to_string(),
            width,
            height,
        })));
    }
    if uri.contains("://") {
        return Err(AcquisitionError::Unavailable(format!(
            "unsupported source '{}'; expected stub:// or a local path",
            uri
        )));
    }
    Ok(Box::new(StillSource::new(StillConfig {
        path: uri.into(),
    })))
}
