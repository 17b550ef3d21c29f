use crate::error::AcquisitionError;
use crate::frame::FrameSample;
use crate::ingest::{FrameSource, LiveVideoHandle};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL (e.g., "stub://front_camera").
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Synthetic live source: a gradient that drifts every frame and changes scene
/// every 50 frames.
pub struct SyntheticSource {
    config: SyntheticConfig,
    active: Option<u64>,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            active: None,
            frame_count: 0,
            scene_state: 0,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.active.is_some()
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count as usize + self.scene_state as usize * 37;
        let mut pixels = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y + shift / 2) % 256) as u8);
                pixels.push(self.scene_state.wrapping_mul(40));
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "{} (synthetic {}x{})",
            self.config.url, self.config.width, self.config.height
        )
    }

    fn acquire(&mut self) -> Result<LiveVideoHandle, AcquisitionError> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(AcquisitionError::Unavailable(format!(
                "{} has zero-sized frames",
                self.config.url
            )));
        }
        if self.active.is_some() {
            return Err(AcquisitionError::Denied(format!(
                "{} is already in use",
                self.config.url
            )));
        }
        let handle = LiveVideoHandle::new(self.config.url.clone());
        self.active = Some(handle.id());
        log::info!("SyntheticSource: acquired {}", self.config.url);
        Ok(handle)
    }

    fn dimensions(&self, _handle: &LiveVideoHandle) -> Option<(u32, u32)> {
        Some((self.config.width, self.config.height))
    }

    fn current_frame(&mut self, handle: &LiveVideoHandle) -> Option<FrameSample> {
        if self.active != Some(handle.id()) {
            return None;
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        match FrameSample::from_rgb(self.config.width, self.config.height, pixels) {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::warn!("SyntheticSource: dropped frame: {err:#}");
                None
            }
        }
    }

    fn release(&mut self, handle: LiveVideoHandle) {
        if self.active == Some(handle.id()) {
            self.active = None;
            log::info!("SyntheticSource: released {}", self.config.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            url: "stub://test".into(),
            width: 32,
            height: 24,
        })
    }

    #[test]
    fn produces_frames_at_configured_size() {
        let mut source = small();
        let handle = source.acquire().unwrap();
        let frame = source.current_frame(&handle).unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
        assert_eq!(source.dimensions(&handle), Some((32, 24)));
    }

    #[test]
    fn frames_change_over_time() {
        let mut source = small();
        let handle = source.acquire().unwrap();
        let a = source.current_frame(&handle).unwrap();
        let b = source.current_frame(&handle).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn release_stops_frames_and_allows_reacquire() {
        let mut source = small();
        let handle = source.acquire().unwrap();
        assert!(matches!(source.acquire(), Err(AcquisitionError::Denied(_))));

        let stale = LiveVideoHandle::new("stub://test");
        source.release(handle);
        assert!(!source.is_acquired());
        assert!(source.current_frame(&stale).is_none());

        let handle = source.acquire().unwrap();
        assert!(source.current_frame(&handle).is_some());
    }
}
