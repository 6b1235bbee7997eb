use image::RgbaImage;

use super::index::SubtitleIndex;
use super::segment::SubtitleSegment;
use crate::render::draw::fill_rect;
use crate::render::palette::Color;
use crate::render::text::{wrap_text, TextOverlay};

const BOX_ALPHA: f32 = 0.35;
const MAX_WIDTH_FRACTION: f32 = 0.9;
const BOTTOM_MARGIN_FRACTION: f32 = 0.08;

/// Default subtitle size for a canvas height.
pub fn default_font_size(height: u32) -> f32 {
    (height as f32 / 20.0).max(24.0)
}

pub struct SubtitleRenderer {
    segments: Vec<SubtitleSegment>,
    index: SubtitleIndex,
    overlay: TextOverlay,
    color: Color,
}

impl SubtitleRenderer {
    pub fn new(
        segments: Vec<SubtitleSegment>,
        index: SubtitleIndex,
        overlay: TextOverlay,
        color: Color,
    ) -> Self {
        Self {
            segments,
            index,
            overlay,
            color,
        }
    }

    pub fn active_segment(&self, frame_index: usize) -> Option<&SubtitleSegment> {
        self.index
            .segment_at(frame_index)
            .and_then(|id| self.segments.get(id))
    }

    /// Draw the segment visible on `frame_index`, if any, in the lower third.
    pub fn render_frame(&self, canvas: &mut RgbaImage, frame_index: usize) {
        let Some(segment) = self.active_segment(frame_index) else {
            return;
        };
        let (width, height) = canvas.dimensions();

        let max_width = (width as f32 * MAX_WIDTH_FRACTION) as u32;
        let lines = wrap_text(&segment.text, max_width, |s| self.overlay.measure_width(s));
        if lines.is_empty() {
            return;
        }

        let font_size = self.overlay.font_size();
        let line_height = self.overlay.line_height().max(font_size);
        let text_height = line_height * lines.len() as f32;

        let pad_x = font_size * 0.6;
        let pad_y = font_size * 0.3;

        let max_line_width = lines
            .iter()
            .map(|l| self.overlay.measure_width(l))
            .max()
            .unwrap_or(0) as f32;

        let box_w = max_line_width + pad_x * 2.0;
        let box_h = text_height + pad_y * 2.0;
        let box_x = ((width as f32 - box_w) / 2.0).max(0.0);
        let box_y = (height as f32 * (1.0 - BOTTOM_MARGIN_FRACTION) - box_h).max(0.0);

        fill_rect(
            canvas,
            box_x,
            box_y,
            box_x + box_w,
            box_y + box_h,
            box_shade(self.color),
            BOX_ALPHA,
        );

        for (i, line) in lines.iter().enumerate() {
            let tw = self.overlay.measure_width(line) as f32;
            let x = ((width as f32 - tw) / 2.0).max(0.0);
            let y = box_y + pad_y + i as f32 * line_height;
            self.overlay
                .composite(canvas, line, x.round() as i64, y.round() as i64, self.color, 1.0);
        }
    }
}

/// Dark box behind light text and vice versa.
fn box_shade(text: Color) -> Color {
    if text.luminance() >= 0.5 {
        Color::rgb(0, 0, 0)
    } else {
        Color::WHITE
    }
}
