use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use rand::Rng;

use super::palette::Color;
use crate::catalog;
use crate::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GradientAxis {
    #[default]
    Vertical,
    Horizontal,
    Diagonal,
}

impl FromStr for GradientAxis {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertical" | "v" => Ok(Self::Vertical),
            "horizontal" | "h" => Ok(Self::Horizontal),
            "diagonal" | "d" => Ok(Self::Diagonal),
            other => Err(RenderError::config(format!(
                "unknown gradient axis '{other}' (expected vertical, horizontal or diagonal)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackgroundSpec {
    Color(Color),
    Gradient {
        from: Color,
        to: Color,
        axis: GradientAxis,
    },
    Image(PathBuf),
    /// Random pick from a catalog directory.
    Random(PathBuf),
}

impl BackgroundSpec {
    /// Interpret `--bg-type` / `--bg-value`. `catalog_dir` is used by `random`
    /// when no value is given.
    pub fn parse(
        mode: &str,
        value: Option<&str>,
        catalog_dir: impl FnOnce() -> PathBuf,
    ) -> RenderResult<Self> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        match mode.trim().to_ascii_lowercase().as_str() {
            "color" => Ok(Self::Color(match value {
                Some(v) => Color::from_hex(v)?,
                None => Color::DEFAULT_BACKGROUND,
            })),
            "gradient" => {
                let v = value.ok_or_else(|| {
                    RenderError::config("--bg-value is required for gradient backgrounds")
                })?;
                let parts: Vec<&str> = v.split(',').map(str::trim).collect();
                match parts.as_slice() {
                    [from, to] => Ok(Self::Gradient {
                        from: from.parse()?,
                        to: to.parse()?,
                        axis: GradientAxis::default(),
                    }),
                    [from, to, axis] => Ok(Self::Gradient {
                        from: from.parse()?,
                        to: to.parse()?,
                        axis: axis.parse()?,
                    }),
                    _ => Err(RenderError::config(format!(
                        "gradient value '{v}' must be '#from,#to[,axis]'"
                    ))),
                }
            }
            "image" => value
                .map(|v| Self::Image(PathBuf::from(v)))
                .ok_or_else(|| RenderError::config("--bg-value is required for image backgrounds")),
            "random" => Ok(Self::Random(
                value.map(PathBuf::from).unwrap_or_else(catalog_dir),
            )),
            other => Err(RenderError::config(format!(
                "unknown background mode '{other}' (expected color, gradient, image or random)"
            ))),
        }
    }
}

/// Largest centered rect of `src` with the aspect ratio of `dst`.
/// Returns `(x, y, width, height)`.
pub fn cover_crop(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32, u32, u32) {
    let (sw, sh) = (src_w as u64, src_h as u64);
    let (dw, dh) = (dst_w.max(1) as u64, dst_h.max(1) as u64);
    if sw * dh > sh * dw {
        // Source is wider: keep full height.
        let w = ((sh * dw + dh / 2) / dh).clamp(1, sw) as u32;
        ((src_w - w) / 2, 0, w, src_h)
    } else {
        let h = ((sw * dh + dw / 2) / dw).clamp(1, sh) as u32;
        (0, (src_h - h) / 2, src_w, h)
    }
}

/// Center-crop to the target aspect, then resize. Never stretches.
pub fn cover_fit(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (x, y, w, h) = cover_crop(img.width(), img.height(), width, height);
    let cropped = imageops::crop_imm(img, x, y, w, h).to_image();
    if cropped.dimensions() == (width, height) {
        return cropped;
    }
    imageops::resize(&cropped, width, height, FilterType::Lanczos3)
}

pub fn load_image(path: &Path) -> RenderResult<RgbaImage> {
    let img = image::open(path).map_err(|e| RenderError::invalid_image(path, e))?;
    Ok(img.to_rgba8())
}

pub fn gradient(width: u32, height: u32, from: Color, to: Color, axis: GradientAxis) -> RgbaImage {
    let span = |n: u32| (n.max(2) - 1) as f32;
    RgbaImage::from_fn(width, height, |x, y| {
        let t = match axis {
            GradientAxis::Vertical => y as f32 / span(height),
            GradientAxis::Horizontal => x as f32 / span(width),
            GradientAxis::Diagonal => (x as f32 / span(width) + y as f32 / span(height)) / 2.0,
        };
        Color::lerp(from, to, t).rgba(255)
    })
}

/// Produce the canvas-sized base image every frame starts from.
pub fn resolve<R: Rng + ?Sized>(
    spec: &BackgroundSpec,
    width: u32,
    height: u32,
    rng: &mut R,
) -> RenderResult<RgbaImage> {
    match spec {
        BackgroundSpec::Color(c) => Ok(RgbaImage::from_pixel(width, height, c.rgba(255))),
        BackgroundSpec::Gradient { from, to, axis } => Ok(gradient(width, height, *from, *to, *axis)),
        BackgroundSpec::Image(path) => {
            let img = load_image(path)?;
            log::info!(
                "Background image {} ({}x{})",
                path.display(),
                img.width(),
                img.height()
            );
            Ok(cover_fit(&img, width, height))
        }
        BackgroundSpec::Random(dir) => {
            let images = catalog::scan(dir)?;
            match catalog::pick(&images, rng) {
                Some(path) => {
                    log::info!("Random background: {}", path.display());
                    resolve(&BackgroundSpec::Image(path.clone()), width, height, rng)
                }
                None => {
                    log::warn!(
                        "No background images under {}, using {}",
                        dir.display(),
                        Color::DEFAULT_BACKGROUND
                    );
                    resolve(&BackgroundSpec::Color(Color::DEFAULT_BACKGROUND), width, height, rng)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn no_catalog() -> PathBuf {
        PathBuf::from("/nonexistent/backgrounds")
    }

    #[test]
    fn parses_every_mode() {
        assert_eq!(
            BackgroundSpec::parse("color", Some("#ff0000"), no_catalog).unwrap(),
            BackgroundSpec::Color(Color::rgb(255, 0, 0))
        );
        assert_eq!(
            BackgroundSpec::parse("color", None, no_catalog).unwrap(),
            BackgroundSpec::Color(Color::DEFAULT_BACKGROUND)
        );
        assert_eq!(
            BackgroundSpec::parse("gradient", Some("#000000, #ffffff, horizontal"), no_catalog).unwrap(),
            BackgroundSpec::Gradient {
                from: Color::rgb(0, 0, 0),
                to: Color::WHITE,
                axis: GradientAxis::Horizontal,
            }
        );
        assert_eq!(
            BackgroundSpec::parse("image", Some("bg.png"), no_catalog).unwrap(),
            BackgroundSpec::Image("bg.png".into())
        );
        assert_eq!(
            BackgroundSpec::parse("random", None, no_catalog).unwrap(),
            BackgroundSpec::Random(no_catalog())
        );
    }

    #[test]
    fn rejects_bad_modes_and_values() {
        for (mode, value) in [
            ("video", Some("x")),
            ("gradient", None),
            ("gradient", Some("#000000")),
            ("gradient", Some("#000000,#ffffff,sideways")),
            ("image", None),
            ("color", Some("blue")),
        ] {
            let err = BackgroundSpec::parse(mode, value, no_catalog).unwrap_err();
            assert!(matches!(err, RenderError::Configuration(_)), "{mode} {value:?}");
        }
    }

    #[test]
    fn crop_matches_canvas_aspect() {
        let canvases = [(1920, 1080), (1080, 1920), (1080, 1080), (1080, 1350)];
        let sources = [(4000, 3000), (3000, 4000), (1000, 1000), (5000, 800), (640, 2000), (7, 3)];
        for &(dw, dh) in &canvases {
            for &(sw, sh) in &sources {
                let (x, y, w, h) = cover_crop(sw, sh, dw, dh);
                assert!(x + w <= sw && y + h <= sh);
                assert!(w == sw || h == sh, "crop keeps one full side");
                // Aspect preserved to within one source pixel of rounding.
                let err = (w as f64 * dh as f64 - h as f64 * dw as f64).abs();
                assert!(err <= dw.max(dh) as f64, "{sw}x{sh} -> {dw}x{dh}: {w}x{h}");
                // Centered.
                assert!((sw - w) / 2 == x && (sh - h) / 2 == y);
            }
        }
    }

    #[test]
    fn cover_fit_fills_the_canvas() {
        let src = RgbaImage::from_pixel(300, 100, Color::WHITE.rgba(255));
        let out = cover_fit(&src, 64, 36);
        assert_eq!(out.dimensions(), (64, 36));
    }

    #[test]
    fn wide_source_loses_its_sides() {
        // Red | green | red columns; a square crop keeps only green.
        let src = RgbaImage::from_fn(300, 100, |x, _| {
            if (100..200).contains(&x) {
                Color::rgb(0, 255, 0).rgba(255)
            } else {
                Color::rgb(255, 0, 0).rgba(255)
            }
        });
        let out = cover_fit(&src, 100, 100);
        assert!(out.pixels().all(|p| p[1] == 255 && p[0] == 0));
    }

    #[test]
    fn gradient_endpoints() {
        let img = gradient(4, 10, Color::rgb(0, 0, 0), Color::WHITE, GradientAxis::Vertical);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(3, 9)[0], 255);
        assert_eq!(img.get_pixel(0, 5), img.get_pixel(3, 5));

        let img = gradient(10, 4, Color::rgb(0, 0, 0), Color::WHITE, GradientAxis::Horizontal);
        assert_eq!(img.get_pixel(9, 0)[0], 255);
        assert_eq!(img.get_pixel(0, 3)[0], 0);

        let img = gradient(10, 10, Color::rgb(0, 0, 0), Color::WHITE, GradientAxis::Diagonal);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(9, 9)[0], 255);
    }

    #[test]
    fn image_background_is_loaded_and_fitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        RgbaImage::from_pixel(40, 30, Color::rgb(10, 20, 30).rgba(255))
            .save(&path)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let out = resolve(&BackgroundSpec::Image(path), 16, 16, &mut rng).unwrap();
        assert_eq!(out.dimensions(), (16, 16));
        let p = out.get_pixel(8, 8);
        for (got, want) in p.0.iter().zip([10u8, 20, 30, 255]) {
            assert!(got.abs_diff(want) <= 1, "{:?}", p);
        }
    }

    #[test]
    fn unreadable_image_is_invalid_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let err = resolve(&BackgroundSpec::Image(path), 16, 16, &mut rng).unwrap_err();
        assert!(matches!(err, RenderError::InvalidImage { .. }));
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn empty_catalog_falls_back_to_solid_color() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let out = resolve(&BackgroundSpec::Random(dir.path().into()), 8, 8, &mut rng).unwrap();
        assert!(out.pixels().all(|p| *p == Color::DEFAULT_BACKGROUND.rgba(255)));
    }

    #[test]
    fn random_picks_from_catalog() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(20, 20, Color::rgb(200, 0, 0).rgba(255))
            .save(dir.path().join("only.png"))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let out = resolve(&BackgroundSpec::Random(dir.path().into()), 10, 10, &mut rng).unwrap();
        let p = out.get_pixel(5, 5);
        assert!(p[0].abs_diff(200) <= 1 && p[1] <= 1 && p[2] <= 1, "{:?}", p);
    }
}
