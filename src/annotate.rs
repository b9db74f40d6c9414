//! Frame Annotation
//!
//! Draws the rep counter panel onto output frames. Two steps:
//!
//! 1. [`Annotator::overlay`] describes what to draw as an [`Overlay`] value
//!    (geometry, text, colors). No pixels involved.
//! 2. [`Overlay::draw`] rasterizes it onto an RGB frame with `imageproc`,
//!    clipped to the frame bounds. Text uses the embedded DejaVu Sans face.
//!
//! The annotator only reads counting results, it never feeds anything back.

use ab_glyph::{Font, FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};

use crate::config::defaults::{PANEL_ORIGIN, PANEL_SIZE};
use crate::config::{AnnotationConfig, PhaseConfig};
use crate::types::{ConditionedSample, Phase};

pub const PANEL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
pub const UP_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const DOWN_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([200, 200, 200]);
pub const ANGLE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const TICK_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const GAP_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

// Text heights in pixels
const COUNT_SCALE: f32 = 32.0;
const LABEL_SCALE: f32 = 16.0;
const GAUGE_HEIGHT: u32 = 10;
const GAUGE_MARGIN: u32 = 4;
const GAP_MARKER_SIZE: u32 = 8;

const FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// Parse the embedded overlay typeface.
pub fn overlay_font() -> Result<FontRef<'static>, InvalidFont> {
    FontRef::try_from_slice(FONT_DATA)
}

// ============================================================================
// Overlay Description
// ============================================================================

/// Filled axis-aligned rectangle in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub color: Rgb<u8>,
}

impl Rect {
    /// `None` for empty rectangles or origins past `i32::MAX`.
    fn to_pixel_rect(self) -> Option<imageproc::rect::Rect> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let x = i32::try_from(self.x).ok()?;
        let y = i32::try_from(self.y).ok()?;
        Some(imageproc::rect::Rect::at(x, y).of_size(self.width, self.height))
    }
}

/// Text anchored at its top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub x: u32,
    pub y: u32,
    /// Glyph height in pixels
    pub scale: f32,
    pub color: Rgb<u8>,
}

/// Horizontal elbow angle gauge spanning 0°..180°.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleGauge {
    pub frame: Rect,
    /// Fill fraction in [0, 1]; `None` when no angle is available
    pub fill: Option<f64>,
    pub fill_color: Rgb<u8>,
    /// Threshold tick positions as fractions of the gauge width
    pub ticks: [f64; 2],
}

/// Everything drawn on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub panel: Rect,
    pub count: TextItem,
    pub angle: TextItem,
    pub label: TextItem,
    pub gauge: Option<AngleGauge>,
    /// Red marker shown while the angle signal is in a gap
    pub gap_marker: Option<Rect>,
}

// ============================================================================
// Annotator
// ============================================================================

/// Stateless overlay renderer.
#[derive(Debug, Clone)]
pub struct Annotator {
    config: AnnotationConfig,
    up_threshold: f64,
    down_threshold: f64,
    font: FontRef<'static>,
}

impl Annotator {
    pub fn new(config: AnnotationConfig, phase: &PhaseConfig) -> Result<Self, InvalidFont> {
        Ok(Self {
            config,
            up_threshold: phase.up_threshold,
            down_threshold: phase.down_threshold,
            font: overlay_font()?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Describe the overlay for one frame.
    pub fn overlay(&self, sample: &ConditionedSample, phase: Phase, rep_count: u32) -> Overlay {
        let (ox, oy) = PANEL_ORIGIN;
        let (pw, ph) = PANEL_SIZE;

        let count_color = if phase == Phase::Up { UP_COLOR } else { DOWN_COLOR };

        let angle_text = sample
            .smoothed_angle
            .map_or_else(|| "--".to_string(), |a| format!("{a:.0}°"));

        let gauge = self.config.show_angle_gauge.then(|| AngleGauge {
            frame: Rect {
                x: ox,
                y: oy + ph + GAUGE_MARGIN,
                width: pw,
                height: GAUGE_HEIGHT,
                color: PANEL_COLOR,
            },
            fill: sample.smoothed_angle.map(|a| (a / 180.0).clamp(0.0, 1.0)),
            fill_color: count_color,
            ticks: [self.up_threshold / 180.0, self.down_threshold / 180.0],
        });

        let gap_marker = sample.is_gap.then_some(Rect {
            x: ox + pw - GAP_MARKER_SIZE - 4,
            y: oy + ph - GAP_MARKER_SIZE - 4,
            width: GAP_MARKER_SIZE,
            height: GAP_MARKER_SIZE,
            color: GAP_COLOR,
        });

        Overlay {
            panel: Rect {
                x: ox,
                y: oy,
                width: pw,
                height: ph,
                color: PANEL_COLOR,
            },
            count: TextItem {
                text: rep_count.to_string(),
                x: ox + 75,
                y: oy + 10,
                scale: COUNT_SCALE,
                color: count_color,
            },
            angle: TextItem {
                text: angle_text,
                x: ox + 6,
                y: oy + 14,
                scale: LABEL_SCALE,
                color: ANGLE_COLOR,
            },
            label: TextItem {
                text: phase.label().to_string(),
                x: ox + 6,
                y: oy + 60,
                scale: LABEL_SCALE,
                color: LABEL_COLOR,
            },
            gauge,
            gap_marker,
        }
    }

    /// Draw the overlay onto `frame` in place. No-op when disabled.
    pub fn render(&self, frame: &mut RgbImage, sample: &ConditionedSample, phase: Phase, rep_count: u32) {
        if !self.config.enabled {
            return;
        }
        self.overlay(sample, phase, rep_count).draw(frame, &self.font);
    }
}

// ============================================================================
// Rasterization
// ============================================================================

impl Overlay {
    pub fn draw(&self, frame: &mut RgbImage, font: &impl Font) {
        fill_rect(frame, &self.panel);
        draw_label(frame, font, &self.count);
        draw_label(frame, font, &self.angle);
        draw_label(frame, font, &self.label);

        if let Some(gauge) = &self.gauge {
            draw_gauge(frame, gauge);
        }
        if let Some(marker) = &self.gap_marker {
            fill_rect(frame, marker);
        }
    }
}

fn fill_rect(frame: &mut RgbImage, rect: &Rect) {
    if let Some(pixels) = rect.to_pixel_rect() {
        draw_filled_rect_mut(frame, pixels, rect.color);
    }
}

fn draw_label(frame: &mut RgbImage, font: &impl Font, item: &TextItem) {
    let (Ok(x), Ok(y)) = (i32::try_from(item.x), i32::try_from(item.y)) else {
        return;
    };
    draw_text_mut(frame, item.color, x, y, PxScale::from(item.scale), font, &item.text);
}

fn draw_gauge(frame: &mut RgbImage, gauge: &AngleGauge) {
    let r = &gauge.frame;
    fill_rect(frame, r);

    let inner = r.width.saturating_sub(2);
    if let Some(fill) = gauge.fill {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let filled = (f64::from(inner) * fill).round() as u32;
        fill_rect(
            frame,
            &Rect {
                x: r.x + 1,
                y: r.y + 1,
                width: filled,
                height: r.height.saturating_sub(2),
                color: gauge.fill_color,
            },
        );
    }

    for tick in gauge.ticks {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let offset = (f64::from(inner) * tick.clamp(0.0, 1.0)).round() as u32;
        fill_rect(
            frame,
            &Rect {
                x: r.x + 1 + offset.min(inner.saturating_sub(1)),
                y: r.y,
                width: 1,
                height: r.height,
                color: TICK_COLOR,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(angle: Option<f64>, is_gap: bool) -> ConditionedSample {
        ConditionedSample {
            frame_index: 0,
            timestamp: 0.0,
            smoothed_angle: angle,
            is_gap,
            gap_length: u32::from(is_gap),
            raw_angle: None,
        }
    }

    fn annotator() -> Annotator {
        Annotator::new(AnnotationConfig::default(), &PhaseConfig::default()).unwrap()
    }

    fn is_green(p: &Rgb<u8>) -> bool {
        p[1] > 200 && p[0] < 60 && p[2] < 60
    }

    #[test]
    fn test_count_color_follows_phase() {
        let a = annotator();
        assert_eq!(a.overlay(&sample(Some(60.0), false), Phase::Up, 3).count.color, UP_COLOR);
        assert_eq!(a.overlay(&sample(Some(170.0), false), Phase::Down, 3).count.color, DOWN_COLOR);
        assert_eq!(a.overlay(&sample(None, true), Phase::Unknown, 0).count.color, DOWN_COLOR);
    }

    #[test]
    fn test_overlay_text() {
        let o = annotator().overlay(&sample(Some(87.4), false), Phase::Up, 12);
        assert_eq!(o.count.text, "12");
        assert_eq!(o.angle.text, "87°");
        assert_eq!(o.label.text, "UP");
        assert_eq!(o.label.color, LABEL_COLOR);
        assert!(o.gap_marker.is_none());
    }

    #[test]
    fn test_panel_geometry() {
        let o = annotator().overlay(&sample(Some(170.0), false), Phase::Down, 0);
        assert_eq!((o.panel.x, o.panel.y, o.panel.width, o.panel.height), (20, 20, 150, 80));
        assert_eq!(o.panel.color, Rgb([0, 0, 0]));
    }

    #[test]
    fn test_gap_marker_and_missing_angle() {
        let o = annotator().overlay(&sample(None, true), Phase::Down, 1);
        assert_eq!(o.angle.text, "--");
        assert_eq!(o.gap_marker.map(|m| m.color), Some(GAP_COLOR));
        assert_eq!(o.gauge.and_then(|g| g.fill), None);
    }

    #[test]
    fn test_gauge_ticks_at_thresholds() {
        let o = annotator().overlay(&sample(Some(90.0), false), Phase::Up, 0);
        let gauge = o.gauge.unwrap();
        assert_eq!(gauge.ticks, [0.5, 160.0 / 180.0]);
        assert_eq!(gauge.fill, Some(0.5));
    }

    #[test]
    fn test_gauge_can_be_hidden() {
        let a = Annotator::new(
            AnnotationConfig { enabled: true, show_angle_gauge: false },
            &PhaseConfig::default(),
        )
        .unwrap();
        assert!(a.overlay(&sample(Some(90.0), false), Phase::Up, 0).gauge.is_none());
    }

    #[test]
    fn test_render_draws_panel() {
        let mut frame = RgbImage::from_pixel(320, 240, Rgb([10, 20, 30]));
        annotator().render(&mut frame, &sample(Some(60.0), false), Phase::Up, 1);
        // Panel corner is black, outside the panel is untouched
        assert_eq!(*frame.get_pixel(21, 21), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(300, 200), Rgb([10, 20, 30]));
        // Count glyph strokes are green
        assert!(frame.pixels().any(is_green));
    }

    #[test]
    fn test_text_lands_inside_its_item_box() {
        // No angle, so the gauge has no green fill
        let o = annotator().overlay(&sample(None, false), Phase::Up, 7);
        let mut frame = RgbImage::new(320, 240);
        o.draw(&mut frame, &overlay_font().unwrap());

        let (cx, cy) = (o.count.x, o.count.y);
        let green: Vec<(u32, u32)> = frame
            .enumerate_pixels()
            .filter(|(_, _, p)| is_green(p))
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!green.is_empty());
        assert!(green.iter().all(|&(x, y)| x >= cx && y >= cy && y < cy + 2 * COUNT_SCALE as u32));
    }

    #[test]
    fn test_empty_gauge_fill_is_skipped() {
        let mut frame = RgbImage::from_pixel(320, 240, Rgb([10, 20, 30]));
        annotator().render(&mut frame, &sample(Some(0.0), false), Phase::Up, 0);
        let gauge = annotator().overlay(&sample(Some(0.0), false), Phase::Up, 0).gauge.unwrap();
        assert_eq!(gauge.fill, Some(0.0));
        // Gauge interior keeps the panel color
        assert_eq!(*frame.get_pixel(gauge.frame.x + 5, gauge.frame.y + 5), PANEL_COLOR);
    }

    #[test]
    fn test_render_disabled_leaves_frame_untouched() {
        let a = Annotator::new(
            AnnotationConfig { enabled: false, show_angle_gauge: true },
            &PhaseConfig::default(),
        )
        .unwrap();
        let mut frame = RgbImage::from_pixel(64, 64, Rgb([10, 20, 30]));
        a.render(&mut frame, &sample(Some(60.0), false), Phase::Up, 1);
        assert!(frame.pixels().all(|p| *p == Rgb([10, 20, 30])));
    }

    #[test]
    fn test_render_clips_small_frames() {
        // Smaller than the panel: must not panic
        let mut frame = RgbImage::new(40, 30);
        annotator().render(&mut frame, &sample(None, true), Phase::Unknown, 0);
        assert_eq!(*frame.get_pixel(39, 29), Rgb([0, 0, 0]));
    }
}
