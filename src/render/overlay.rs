use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::background::load_image;
use crate::error::RenderResult;

const MASK_SUPERSAMPLE: u32 = 4;

/// Default avatar diameter: a quarter of the shorter canvas side.
pub fn default_avatar_size(width: u32, height: u32) -> u32 {
    (width.min(height) / 4).max(1)
}

/// A circular, pre-masked avatar ready to paste.
#[derive(Clone, Debug)]
pub struct Avatar {
    image: RgbaImage,
}

impl Avatar {
    pub fn load(path: &Path, size: u32) -> RenderResult<Self> {
        let img = load_image(path)?;
        log::info!("Avatar {} -> {}px circle", path.display(), size);
        Ok(Self::from_image(&img, size))
    }

    /// Center square crop, resize, then apply an anti-aliased circular mask.
    pub fn from_image(img: &RgbaImage, size: u32) -> Self {
        let size = size.max(1);
        let side = img.width().min(img.height()).max(1);
        let x = (img.width() - side) / 2;
        let y = (img.height() - side) / 2;
        let square = imageops::crop_imm(img, x, y, side, side).to_image();
        let mut image = if side == size {
            square
        } else {
            imageops::resize(&square, size, size, FilterType::Lanczos3)
        };

        let mask = circle_mask(size);
        for (p, &m) in image.pixels_mut().zip(&mask) {
            p[3] = ((p[3] as u32 * m as u32 + 127) / 255) as u8;
        }
        Self { image }
    }

    pub fn size(&self) -> u32 {
        self.image.width()
    }

    /// Paste with the avatar's center at `(cx, cy)`.
    pub fn paste_at(&self, canvas: &mut RgbaImage, cx: i64, cy: i64) {
        let x = cx - self.image.width() as i64 / 2;
        let y = cy - self.image.height() as i64 / 2;
        imageops::overlay(canvas, &self.image, x, y);
    }

    pub fn paste_centered(&self, canvas: &mut RgbaImage) {
        self.paste_at(canvas, canvas.width() as i64 / 2, canvas.height() as i64 / 2);
    }
}

/// Row-major alpha mask of a circle filling a `size`-square, 4x4 supersampled.
fn circle_mask(size: u32) -> Vec<u8> {
    let radius = size as f32 / 2.0;
    let samples = MASK_SUPERSAMPLE * MASK_SUPERSAMPLE;
    let mut mask = Vec::with_capacity((size * size) as usize);
    for py in 0..size {
        for px in 0..size {
            let mut inside = 0;
            for sy in 0..MASK_SUPERSAMPLE {
                for sx in 0..MASK_SUPERSAMPLE {
                    let x = px as f32 + (sx as f32 + 0.5) / MASK_SUPERSAMPLE as f32 - radius;
                    let y = py as f32 + (sy as f32 + 0.5) / MASK_SUPERSAMPLE as f32 - radius;
                    if x * x + y * y <= radius * radius {
                        inside += 1;
                    }
                }
            }
            mask.push((inside * 255 / samples) as u8);
        }
    }
    mask
}
