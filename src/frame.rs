//! Captured frames.
//!
//! A `FrameSample` is one still taken from the live source. It is moved into the
//! detection worker for its round and handed back with the result, so exactly one
//! owner holds it at any time. There is no `Clone`: a sample is used for one round
//! and then dropped.

use std::io::Cursor;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// JPEG quality used when a frame leaves the process.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// One captured frame at the source's native dimensions.
pub struct FrameSample {
    /// RGB8 pixels, row-major, `width * height * 3` bytes.
    pixels: RgbImage,

    pub width: u32,
    pub height: u32,

    /// Monotonic capture instant (latency bookkeeping only).
    captured_at: Instant,
}

impl FrameSample {
    /// Wrap raw RGB8 pixels. Fails if the buffer does not match the dimensions.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer holds {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            ));
        }
        let pixels = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("failed to build {}x{} frame", width, height))?;
        Ok(Self::from_image(pixels))
    }

    pub fn from_image(pixels: RgbImage) -> Self {
        let (width, height) = pixels.dimensions();
        Self {
            pixels,
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    /// Solid-colour frame, handy for tests and placeholder sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Raw RGB8 bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }

    /// Encode as a compressed still for transport to a detection service.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&self.pixels)
            .context("JPEG encode failed")?;
        Ok(buffer.into_inner())
    }
}

impl std::fmt::Debug for FrameSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content stays out of logs.
        f.debug_struct("FrameSample")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
