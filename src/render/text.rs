use std::path::Path;
use std::sync::Arc;

use fontdue::{Font, FontSettings};
use image::RgbaImage;

use super::draw::blend_pixel;
use super::palette::Color;
use crate::error::{RenderError, RenderResult};

/// Fonts tried, in order, when none is configured.
pub const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "/System/Library/Fonts/SFNSText.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Compiled into the binary so text always has a face to render with.
static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

/// A font at one pixel size. Clones share the parsed face.
#[derive(Clone)]
pub struct TextOverlay {
    font: Arc<Font>,
    font_size: f32,
}

impl TextOverlay {
    pub fn from_bytes(bytes: Vec<u8>, font_size: f32) -> Result<Self, String> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(String::from)?;
        Ok(Self {
            font: Arc::new(font),
            font_size,
        })
    }

    pub fn load(path: &Path, font_size: f32) -> RenderResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RenderError::config(format!("cannot read font {}: {e}", path.display())))?;
        Self::from_bytes(bytes, font_size)
            .map_err(|e| RenderError::config(format!("invalid font {}: {e}", path.display())))
    }

    /// DejaVu Sans Bold, shipped inside the binary.
    pub fn bundled(font_size: f32) -> RenderResult<Self> {
        Self::from_bytes(BUNDLED_FONT.to_vec(), font_size)
            .map_err(|e| RenderError::config(format!("bundled font is unreadable: {e}")))
    }

    /// The configured font if given, then the first usable system font, then
    /// the bundled one.
    pub fn discover(configured: Option<&Path>, font_size: f32) -> RenderResult<Self> {
        if let Some(path) = configured {
            match Self::load(path, font_size) {
                Ok(overlay) => return Ok(overlay),
                Err(e) => log::warn!("{e}; trying system fonts"),
            }
        }
        let system = SYSTEM_FONT_PATHS
            .iter()
            .map(Path::new)
            .filter(|p| p.exists())
            .find_map(|p| {
                let overlay = Self::load(p, font_size).ok()?;
                log::debug!("Using font {}", p.display());
                Some(overlay)
            });
        match system {
            Some(overlay) => Ok(overlay),
            None => {
                log::debug!("No system font found, using the bundled one");
                Self::bundled(font_size)
            }
        }
    }

    /// Same face at another size.
    pub fn with_size(&self, font_size: f32) -> Self {
        Self {
            font: Arc::clone(&self.font),
            font_size: font_size.max(1.0),
        }
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    fn ascent(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.font_size)
            .map(|m| m.ascent)
            .unwrap_or(self.font_size * 0.8)
    }

    pub fn line_height(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.font_size)
            .map(|m| m.new_line_size)
            .unwrap_or(self.font_size * 1.2)
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure_width(&self, text: &str) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, self.font_size).advance_width)
            .sum();
        width.ceil() as u32
    }

    /// Draw a single line with its top edge at `y`.
    pub fn composite(&self, canvas: &mut RgbaImage, text: &str, x: i64, y: i64, color: Color, alpha: f32) {
        let baseline = y as f32 + self.ascent();
        let mut cursor_x = x as f32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_x = (cursor_x + metrics.xmin as f32).round() as i64;
            let glyph_y = (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i64;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    blend_pixel(
                        canvas,
                        glyph_x + gx as i64,
                        glyph_y + gy as i64,
                        color,
                        alpha * coverage as f32 / 255.0,
                    );
                }
            }
            cursor_x += metrics.advance_width;
        }
    }
}

/// Greedy word wrap by measured pixel width. A single word wider than
/// `max_width` gets its own line.
pub fn wrap_text(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn chars(s: &str) -> u32 {
        s.chars().count() as u32 * 10
    }

    #[test]
    fn missing_font_file_is_a_configuration_error() {
        let err = TextOverlay::load(Path::new("/nonexistent/font.ttf"), 20.0).err().unwrap();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert!(TextOverlay::from_bytes(b"not a font".to_vec(), 20.0).is_err());
    }

    #[test]
    fn bundled_font_always_loads() {
        let overlay = TextOverlay::bundled(20.0).unwrap();
        assert!(overlay.measure_width("abc") > 0);
    }

    #[test]
    fn bad_configured_font_still_yields_a_font() {
        let overlay = TextOverlay::discover(Some(Path::new("/nonexistent/font.ttf")), 20.0).unwrap();
        assert_eq!(overlay.font_size(), 20.0);
        assert!(overlay.measure_width("Hello") > 0);
    }

    #[test]
    fn resizing_keeps_the_face() {
        let small = TextOverlay::bundled(10.0).unwrap();
        let large = small.with_size(40.0);
        assert_eq!(large.font_size(), 40.0);
        assert!(large.measure_width("Hello") > small.measure_width("Hello") * 3);
    }

    #[test]
    fn text_draws_within_measured_box() {
        let overlay = TextOverlay::bundled(24.0).unwrap();
        let mut canvas = RgbaImage::from_pixel(200, 60, Rgba([0, 0, 0, 255]));
        overlay.composite(&mut canvas, "Hello", 10, 10, Color::WHITE, 1.0);

        let width = overlay.measure_width("Hello");
        assert!(width > 20 && width < 150);
        let lit: Vec<(u32, u32)> = canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!lit.is_empty());
        assert!(lit.iter().all(|&(x, _)| x >= 9 && x <= 10 + width + 2));
        assert!(overlay.measure_width("Hello world") > width);
    }

    #[test]
    fn wrap_short_text() {
        assert_eq!(wrap_text("Hello world", 420, chars), vec!["Hello world"]);
    }

    #[test]
    fn wrap_long_text() {
        let lines = wrap_text("This is a somewhat longer sentence that should wrap", 200, chars);
        assert!(lines.len() >= 3);
        assert!(lines.iter().all(|l| chars(l) <= 200));
        assert_eq!(lines.join(" "), "This is a somewhat longer sentence that should wrap");
    }

    #[test]
    fn overlong_word_gets_its_own_line() {
        let lines = wrap_text("a supercalifragilistic b", 50, chars);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }
}
