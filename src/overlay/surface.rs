use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::RenderError;
use crate::frame::FrameSample;
use crate::overlay::font;

/// Integer pixel rectangle. `w`/`h` are exclusive extents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }
}

/// Drawing target for overlays.
///
/// Colours carry alpha; `fill_rect` blends with what is already there, every
/// other primitive paints opaque.
pub trait Surface {
    fn dimensions(&self) -> (u32, u32);

    /// Clear the surface and paint `frame` over all of it.
    fn draw_frame(&mut self, frame: &FrameSample) -> Result<(), RenderError>;

    fn stroke_rect(&mut self, rect: Rect, line_width: u32, color: Rgba<u8>);

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>);

    fn measure_text(&self, text: &str) -> u32;

    /// Height of one line of text.
    fn line_height(&self) -> u32;

    /// Draw `text` with its top-left corner at `(x, y)`.
    fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Rgba<u8>);
}

/// In-memory RGBA surface.
pub struct ImageSurface {
    image: RgbaImage,
    text_scale: u32,
    /// When false, frames must match the surface size exactly.
    fit_to_frame: bool,
}

impl ImageSurface {
    /// Surface that resizes itself to whatever frame it is asked to draw.
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            text_scale: 2,
            fit_to_frame: true,
        }
    }

    /// Fixed-size surface; drawing a frame of another size is a `RenderError`.
    pub fn fixed(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            text_scale: 2,
            fit_to_frame: false,
        }
    }

    pub fn with_text_scale(mut self, scale: u32) -> Self {
        self.text_scale = scale.max(1);
        self
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.image.get_pixel_checked(x, y).copied()
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgb = DynamicImage::ImageRgba8(self.image.clone()).to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&rgb)
            .context("JPEG encode of overlay surface failed")?;
        Ok(buffer)
    }

    /// Rect clipped to the surface, as inclusive-exclusive pixel ranges.
    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let (width, height) = self.image.dimensions();
        let left = rect.x.max(0);
        let top = rect.y.max(0);
        let right = rect.right().min(width as i32);
        let bottom = rect.bottom().min(height as i32);
        if left >= right || top >= bottom {
            return None;
        }
        Some((left as u32, top as u32, right as u32, bottom as u32))
    }

    fn paint(&mut self, rect: Rect, color: Rgba<u8>) {
        if let Some((left, top, right, bottom)) = self.clip(rect) {
            for y in top..bottom {
                for x in left..right {
                    self.image.put_pixel(x, y, color);
                }
            }
        }
    }
}

impl Default for ImageSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for ImageSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn draw_frame(&mut self, frame: &FrameSample) -> Result<(), RenderError> {
        let src = frame.as_bytes();
        let expected = frame.width as usize * frame.height as usize * 3;
        if src.len() != expected {
            return Err(RenderError::BadFrameBuffer {
                expected,
                actual: src.len(),
            });
        }

        let (surface_w, surface_h) = self.image.dimensions();
        if (surface_w, surface_h) != (frame.width, frame.height) {
            if !self.fit_to_frame {
                return Err(RenderError::SizeMismatch {
                    surface_w,
                    surface_h,
                    frame_w: frame.width,
                    frame_h: frame.height,
                });
            }
            self.image = RgbaImage::new(frame.width, frame.height);
        }
        for (dst, rgb) in self.image.pixels_mut().zip(src.chunks_exact(3)) {
            *dst = Rgba([rgb[0], rgb[1], rgb[2], 255]);
        }
        Ok(())
    }

    fn stroke_rect(&mut self, rect: Rect, line_width: u32, color: Rgba<u8>) {
        if line_width == 0 {
            return;
        }
        // Stroke is centred on the rectangle edge, like a canvas path stroke.
        let half = (line_width / 2) as i32;
        let outer = Rect::new(
            rect.x - half,
            rect.y - half,
            rect.w + line_width,
            rect.h + line_width,
        );
        self.paint(Rect::new(outer.x, outer.y, outer.w, line_width), color);
        self.paint(
            Rect::new(outer.x, outer.bottom() - line_width as i32, outer.w, line_width),
            color,
        );
        self.paint(Rect::new(outer.x, outer.y, line_width, outer.h), color);
        self.paint(
            Rect::new(outer.right() - line_width as i32, outer.y, line_width, outer.h),
            color,
        );
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        let Some((left, top, right, bottom)) = self.clip(rect) else {
            return;
        };
        let alpha = color[3] as u32;
        if alpha == 255 {
            self.paint(rect, color);
            return;
        }
        for y in top..bottom {
            for x in left..right {
                let dst = self.image.get_pixel_mut(x, y);
                for channel in 0..3 {
                    let blended =
                        (color[channel] as u32 * alpha + dst[channel] as u32 * (255 - alpha)) / 255;
                    dst[channel] = blended as u8;
                }
                dst[3] = 255;
            }
        }
    }

    fn measure_text(&self, text: &str) -> u32 {
        font::text_width(text, self.text_scale)
    }

    fn line_height(&self) -> u32 {
        font::line_height(self.text_scale)
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Rgba<u8>) {
        let scale = self.text_scale;
        let mut pen_x = x;
        for ch in text.chars() {
            if let Some(rows) = font::glyph(ch) {
                for (row, pattern) in rows.iter().enumerate() {
                    for col in 0..font::GLYPH_WIDTH {
                        if (pattern >> (font::GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                            self.paint(
                                Rect::new(
                                    pen_x + (col * scale) as i32,
                                    y + (row as u32 * scale) as i32,
                                    scale,
                                    scale,
                                ),
                                color,
                            );
                        }
                    }
                }
            }
            pen_x += (font::ADVANCE * scale) as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_frame_resizes_and_replaces_content() {
        let mut surface = ImageSurface::new();
        surface.draw_frame(&FrameSample::filled(8, 4, [1, 2, 3])).unwrap();
        assert_eq!(surface.dimensions(), (8, 4));
        surface.fill_rect(Rect::new(0, 0, 8, 4), Rgba([255, 255, 255, 255]));
        surface.draw_frame(&FrameSample::filled(8, 4, [1, 2, 3])).unwrap();
        assert_eq!(surface.pixel(3, 3), Some(Rgba([1, 2, 3, 255])));
    }

    #[test]
    fn fixed_surface_rejects_other_sizes() {
        let mut surface = ImageSurface::fixed(8, 8);
        let err = surface
            .draw_frame(&FrameSample::filled(4, 4, [0, 0, 0]))
            .unwrap_err();
        assert!(matches!(err, RenderError::SizeMismatch { .. }));
    }

    #[test]
    fn translucent_fill_blends() {
        let mut surface = ImageSurface::new();
        surface.draw_frame(&FrameSample::filled(4, 4, [0, 0, 0])).unwrap();
        surface.fill_rect(Rect::new(0, 0, 4, 4), Rgba([255, 0, 0, 51]));
        assert_eq!(surface.pixel(1, 1), Some(Rgba([51, 0, 0, 255])));
    }

    #[test]
    fn stroke_is_centred_and_clipped() {
        let mut surface = ImageSurface::new();
        surface.draw_frame(&FrameSample::filled(20, 20, [0, 0, 0])).unwrap();
        surface.stroke_rect(Rect::new(0, 5, 10, 10), 2, Rgba([0, 255, 0, 255]));
        let green = Some(Rgba([0, 255, 0, 255]));
        assert_eq!(surface.pixel(0, 10), green);
        assert_eq!(surface.pixel(5, 4), green);
        assert_eq!(surface.pixel(5, 5), green);
        assert_eq!(surface.pixel(5, 10), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(surface.pixel(10, 10), green);
    }

    #[test]
    fn draws_text_pixels() {
        let mut surface = ImageSurface::new().with_text_scale(1);
        surface.draw_frame(&FrameSample::filled(12, 8, [0, 0, 0])).unwrap();
        surface.draw_text(0, 0, "-", Rgba([255, 255, 255, 255]));
        assert_eq!(surface.pixel(0, 3), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(surface.pixel(0, 0), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(surface.measure_text("ab"), 12);
    }
}
