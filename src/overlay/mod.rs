//! Bounding-box overlays.
//!
//! Each render starts from the round's own frame, so overlays never accumulate
//! across rounds. Per detection, in list order: translucent fill and solid stroke
//! in the class colour, then an opaque caption plate directly above the box's
//! top-left corner with the caption text in white.
//!
//! Output is a pure function of (frame, detections, style): no randomness in
//! colour or placement.

pub mod font;
mod surface;

pub use surface::{ImageSurface, Rect, Surface};

use image::Rgba;

use crate::classify::{Classification, Classifier};
use crate::detect::Detection;
use crate::error::RenderError;
use crate::frame::FrameSample;

/// Colours and metrics for overlays.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub violation_stroke: Rgba<u8>,
    pub violation_fill: Rgba<u8>,
    pub compliant_stroke: Rgba<u8>,
    pub compliant_fill: Rgba<u8>,
    pub text_color: Rgba<u8>,
    pub line_width: u32,
    pub label_height: u32,
    /// Total horizontal padding around the caption text.
    pub label_padding: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            violation_stroke: Rgba([255, 0, 0, 255]),
            violation_fill: Rgba([255, 0, 0, 51]),
            compliant_stroke: Rgba([0, 128, 0, 255]),
            compliant_fill: Rgba([0, 255, 0, 51]),
            text_color: Rgba([255, 255, 255, 255]),
            line_width: 2,
            label_height: 25,
            label_padding: 10,
        }
    }
}

impl OverlayStyle {
    /// `(stroke, fill)` for a classification.
    pub fn colors(&self, class: Classification) -> (Rgba<u8>, Rgba<u8>) {
        match class {
            Classification::Violation => (self.violation_stroke, self.violation_fill),
            Classification::Compliant => (self.compliant_stroke, self.compliant_fill),
        }
    }
}

/// Paints classified detections onto a surface.
#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer {
    classifier: Classifier,
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(classifier: Classifier, style: OverlayStyle) -> Self {
        Self { classifier, style }
    }

    /// Redraw `frame` onto `surface`, then overlay `detections`.
    ///
    /// `detections` are expected to be confidence-filtered already.
    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        frame: &FrameSample,
        detections: &[Detection],
    ) -> Result<(), RenderError> {
        surface.draw_frame(frame)?;
        for detection in detections {
            self.draw_detection(surface, detection);
        }
        Ok(())
    }

    fn draw_detection<S: Surface + ?Sized>(&self, surface: &mut S, detection: &Detection) {
        let class = self.classifier.classify(&detection.label);
        let (stroke, fill) = self.style.colors(class);

        let bbox = &detection.bbox;
        let x1 = bbox.x1.round() as i32;
        let y1 = bbox.y1.round() as i32;
        let rect = Rect::new(
            x1,
            y1,
            (bbox.x2.round() as i32 - x1).max(1) as u32,
            (bbox.y2.round() as i32 - y1).max(1) as u32,
        );
        surface.fill_rect(rect, fill);
        surface.stroke_rect(rect, self.style.line_width, stroke);

        let caption = detection.caption();
        let plate = self.caption_plate(surface, rect, surface.measure_text(&caption));
        surface.fill_rect(plate, stroke);

        let text_height = surface.line_height();
        let text_y = plate.y + (plate.h.saturating_sub(text_height) / 2) as i32;
        surface.draw_text(
            plate.x + (self.style.label_padding / 2) as i32,
            text_y,
            &caption,
            self.style.text_color,
        );
    }

    /// Caption plate above the box's top-left corner, clamped onto the surface.
    pub fn caption_plate<S: Surface + ?Sized>(&self, surface: &S, rect: Rect, text_width: u32) -> Rect {
        let (surface_w, _) = surface.dimensions();
        let width = text_width + self.style.label_padding;
        let height = self.style.label_height;

        let y = (rect.y - height as i32).max(0);
        let max_x = (surface_w as i32 - width as i32).max(0);
        let x = rect.x.clamp(0, max_x);
        Rect::new(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, confidence: f32, b: (f32, f32, f32, f32)) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(b.0, b.1, b.2, b.3).unwrap()).unwrap()
    }

    #[test]
    fn violation_box_is_red_and_compliant_is_green() {
        let renderer = OverlayRenderer::default();
        let frame = FrameSample::filled(200, 200, [100, 100, 100]);
        let mut surface = ImageSurface::new();
        renderer
            .render(
                &mut surface,
                &frame,
                &[
                    det("NO-Hardhat", 0.9, (10.0, 40.0, 50.0, 80.0)),
                    det("Hardhat", 0.8, (100.0, 100.0, 150.0, 150.0)),
                ],
            )
            .unwrap();

        assert_eq!(surface.pixel(10, 60), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(surface.pixel(100, 125), Some(Rgba([0, 128, 0, 255])));

        let inside_red = surface.pixel(30, 70).unwrap();
        assert!(inside_red[0] > inside_red[1]);
        let inside_green = surface.pixel(125, 140).unwrap();
        assert!(inside_green[1] > inside_green[0]);
        // Untouched background.
        assert_eq!(surface.pixel(190, 5), Some(Rgba([100, 100, 100, 255])));
    }

    #[test]
    fn overlays_do_not_accumulate() {
        let renderer = OverlayRenderer::default();
        let frame = FrameSample::filled(120, 120, [10, 20, 30]);
        let mut surface = ImageSurface::new();
        renderer
            .render(&mut surface, &frame, &[det("NO-Mask", 0.7, (40.0, 40.0, 90.0, 90.0))])
            .unwrap();
        renderer.render(&mut surface, &frame, &[]).unwrap();
        for (_, _, px) in surface.image().enumerate_pixels() {
            assert_eq!(*px, Rgba([10, 20, 30, 255]));
        }
    }

    #[test]
    fn caption_plate_clamps_to_top_and_right_edges() {
        let renderer = OverlayRenderer::default();
        let mut surface = ImageSurface::new();
        surface.draw_frame(&FrameSample::filled(100, 100, [0, 0, 0])).unwrap();

        let plate = renderer.caption_plate(&surface, Rect::new(10, 5, 20, 20), 40);
        assert_eq!(plate, Rect::new(10, 0, 50, 25));

        let plate = renderer.caption_plate(&surface, Rect::new(10, 60, 20, 20), 40);
        assert_eq!(plate, Rect::new(10, 35, 50, 25));

        let plate = renderer.caption_plate(&surface, Rect::new(80, 60, 10, 10), 40);
        assert_eq!(plate.x, 50);
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = OverlayRenderer::default();
        let frame = FrameSample::filled(160, 120, [5, 5, 5]);
        let detections = [
            det("Person", 0.66, (5.0, 30.0, 60.0, 100.0)),
            det("NO-Safety Vest", 0.51, (70.0, 40.0, 150.0, 110.0)),
        ];
        let mut a = ImageSurface::new();
        let mut b = ImageSurface::new();
        renderer.render(&mut a, &frame, &detections).unwrap();
        renderer.render(&mut b, &frame, &detections).unwrap();
        assert_eq!(a.image().as_raw(), b.image().as_raw());
    }
}
