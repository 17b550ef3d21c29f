//! Local still-image source.
//!
//! Loops over one image file, or every image in a directory (sorted by file
//! name), as if it were a live feed. Images are decoded once at acquire time.
//! Remote URLs are refused.

use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::AcquisitionError;
use crate::frame::FrameSample;
use crate::ingest::{FrameSource, LiveVideoHandle};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Configuration for a still-image source.
#[derive(Clone, Debug)]
pub struct StillConfig {
    /// Image file or directory of images.
    pub path: PathBuf,
}

pub struct StillSource {
    config: StillConfig,
    active: Option<u64>,
    stills: Vec<RgbImage>,
    cursor: usize,
}

impl StillSource {
    pub fn new(config: StillConfig) -> Self {
        Self {
            config,
            active: None,
            stills: Vec::new(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.stills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stills.is_empty()
    }

    fn collect_paths(&self) -> Result<Vec<PathBuf>, AcquisitionError> {
        let path = &self.config.path;
        let meta = std::fs::metadata(path).map_err(|err| io_to_acquisition(path, err))?;
        if meta.is_file() {
            return Ok(vec![path.clone()]);
        }

        let entries = std::fs::read_dir(path).map_err(|err| io_to_acquisition(path, err))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|p| is_image_path(p))
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(AcquisitionError::Unavailable(format!(
                "no images found in {}",
                path.display()
            )));
        }
        Ok(paths)
    }
}

impl FrameSource for StillSource {
    fn describe(&self) -> String {
        format!("{} (stills)", self.config.path.display())
    }

    fn acquire(&mut self) -> Result<LiveVideoHandle, AcquisitionError> {
        if self.active.is_some() {
            return Err(AcquisitionError::Denied(format!(
                "{} is already in use",
                self.config.path.display()
            )));
        }
        let mut stills = Vec::new();
        for path in self.collect_paths()? {
            let decoded = image::open(&path).map_err(|err| {
                AcquisitionError::Unavailable(format!("cannot decode {}: {}", path.display(), err))
            })?;
            stills.push(decoded.to_rgb8());
        }

        self.stills = stills;
        self.cursor = 0;
        let handle = LiveVideoHandle::new(self.config.path.display().to_string());
        self.active = Some(handle.id());
        log::info!(
            "StillSource: acquired {} ({} image(s))",
            self.config.path.display(),
            self.stills.len()
        );
        Ok(handle)
    }

    fn is_ready(&self, handle: &LiveVideoHandle) -> bool {
        self.active == Some(handle.id()) && !self.stills.is_empty()
    }

    fn dimensions(&self, handle: &LiveVideoHandle) -> Option<(u32, u32)> {
        if self.active != Some(handle.id()) {
            return None;
        }
        self.stills.get(self.cursor).map(|img| img.dimensions())
    }

    fn current_frame(&mut self, handle: &LiveVideoHandle) -> Option<FrameSample> {
        if self.active != Some(handle.id()) || self.stills.is_empty() {
            return None;
        }
        let still = self.stills[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.stills.len();
        Some(FrameSample::from_image(still))
    }

    fn release(&mut self, handle: LiveVideoHandle) {
        if self.active == Some(handle.id()) {
            self.active = None;
            self.stills.clear();
            self.cursor = 0;
            log::info!("StillSource: released {}", self.config.path.display());
        }
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn io_to_acquisition(path: &Path, err: io::Error) -> AcquisitionError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            AcquisitionError::Denied(format!("{}: {}", path.display(), err))
        }
        _ => AcquisitionError::Unavailable(format!("{}: {}", path.display(), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(6, 4, image::Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn loops_over_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 20);
        write_png(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = StillSource::new(StillConfig {
            path: dir.path().to_path_buf(),
        });
        let handle = source.acquire().unwrap();
        assert!(source.is_ready(&handle));
        assert_eq!(source.len(), 2);
        assert_eq!(source.dimensions(&handle), Some((6, 4)));

        let shades: Vec<u8> = (0..3)
            .map(|_| source.current_frame(&handle).unwrap().as_bytes()[0])
            .collect();
        assert_eq!(shades, vec![10, 20, 10]);

        source.release(handle);
        assert!(source.is_empty());
    }

    #[test]
    fn missing_path_fails_with_readable_text() {
        let mut source = StillSource::new(StillConfig {
            path: PathBuf::from("/nonexistent/ppe-stills"),
        });
        let err = source.acquire().unwrap_err();
        assert!(matches!(err, AcquisitionError::Unavailable(_)));
        assert!(err.to_string().contains("/nonexistent/ppe-stills"));
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = StillSource::new(StillConfig {
            path: dir.path().to_path_buf(),
        });
        let err = source.acquire().unwrap_err();
        assert!(err.to_string().contains("no images found"));
    }
}
