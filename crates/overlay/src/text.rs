//! Text rasterisation for the data panel.

use std::path::Path;

use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use fitoverlay_common::config::FontConfig;
use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

use crate::draw::blend_pixel;

/// The two faces used by the data panel.
pub struct FontSet {
    pub bold: Font<'static>,
    pub regular: Font<'static>,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet").finish_non_exhaustive()
    }
}

/// DejaVu Sans Bold, used when neither configured face can be read.
const BUNDLED_FACE: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");

impl FontSet {
    /// Load both faces. Either face stands in for the other when only one
    /// of them can be read.
    pub fn load(config: &FontConfig) -> FitoverlayResult<Self> {
        match (load_font(&config.bold), load_font(&config.regular)) {
            (Ok(bold), Ok(regular)) => Ok(Self { bold, regular }),
            (Ok(bold), Err(err)) => {
                tracing::warn!(error = %err, "Regular font unavailable, using bold face for units");
                Ok(Self {
                    regular: bold.clone(),
                    bold,
                })
            }
            (Err(err), Ok(regular)) => {
                tracing::warn!(error = %err, "Bold font unavailable, using regular face for values");
                Ok(Self {
                    bold: regular.clone(),
                    regular,
                })
            }
            (Err(err), Err(_)) => Err(err),
        }
    }

    /// The face compiled into the binary, for both roles.
    pub fn bundled() -> FitoverlayResult<Self> {
        let face = Font::try_from_bytes(BUNDLED_FACE)
            .ok_or_else(|| FitoverlayError::config("bundled font is not a usable font"))?;
        Ok(Self {
            regular: face.clone(),
            bold: face,
        })
    }

    /// Configured faces, or the bundled one when neither can be read.
    ///
    /// `None` only if the bundled face is unusable too, in which case the
    /// data panel is not drawn.
    pub fn load_or_bundled(config: &FontConfig) -> Option<Self> {
        let err = match Self::load(config) {
            Ok(fonts) => return Some(fonts),
            Err(err) => err,
        };
        tracing::warn!(error = %err, "Configured fonts unavailable, using bundled DejaVu Sans Bold");
        match Self::bundled() {
            Ok(fonts) => Some(fonts),
            Err(err) => {
                tracing::error!(error = %err, "No usable font, data panel text will not be drawn");
                None
            }
        }
    }
}

fn load_font(path: &Path) -> FitoverlayResult<Font<'static>> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FitoverlayError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => FitoverlayError::Io(e),
    })?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| FitoverlayError::config(format!("{} is not a usable font", path.display())))
}

/// Advance width of `text` at `px` pixels.
pub fn text_width(font: &Font<'_>, px: f32, text: &str) -> f32 {
    let scale = Scale::uniform(px);
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Draw `text` with its top-left corner at `(x, y)`; returns the advance width.
pub fn draw_text(
    canvas: &mut RgbaImage,
    font: &Font<'_>,
    px: f32,
    x: i64,
    y: i64,
    color: Rgba<u8>,
    text: &str,
) -> f32 {
    let scale = Scale::uniform(px);
    let ascent = font.v_metrics(scale).ascent;
    let origin = point(x as f32, y as f32 + ascent);

    let mut advance = 0.0f32;
    for glyph in font.layout(text, scale, origin) {
        advance = glyph.position().x - x as f32 + glyph.unpositioned().h_metrics().advance_width;
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                blend_pixel(
                    canvas,
                    bb.min.x as i64 + gx as i64,
                    bb.min.y as i64 + gy as i64,
                    color,
                    coverage,
                );
            });
        }
    }
    advance
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_font_reports_path() {
        let config = FontConfig {
            bold: PathBuf::from("/no/such/font.ttf"),
            regular: PathBuf::from("/no/such/font.ttf"),
        };
        let err = FontSet::load(&config).unwrap_err();
        assert!(matches!(err, FitoverlayError::FileNotFound { .. }));
    }

    #[test]
    fn test_bundled_face_replaces_missing_fonts() {
        let config = FontConfig {
            bold: PathBuf::from("/no/such/bold.ttf"),
            regular: PathBuf::from("/no/such/regular.ttf"),
        };
        let fonts = FontSet::load_or_bundled(&config).unwrap();
        let mut canvas = RgbaImage::new(200, 60);
        let advance = draw_text(&mut canvas, &fonts.bold, 40.0, 4, 4, Rgba([255, 255, 255, 255]), "145");
        assert!(advance > 0.0);
        assert!(canvas.pixels().any(|p| p[3] == 255));
    }

    #[test]
    fn test_regular_face_stands_in_for_missing_bold() {
        let dir = std::env::temp_dir().join(format!("fitoverlay-font-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let regular = dir.join("regular.ttf");
        std::fs::write(&regular, BUNDLED_FACE).unwrap();

        let config = FontConfig {
            bold: dir.join("missing-bold.ttf"),
            regular,
        };
        let fonts = FontSet::load(&config).unwrap();
        assert!(text_width(&fonts.bold, 30.0, "bpm") > 0.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_system_font_draws_pixels_when_present() {
        let Ok(fonts) = FontSet::load(&FontConfig::default()) else {
            eprintln!("skipping: default fonts not installed");
            return;
        };
        let mut canvas = RgbaImage::new(200, 60);
        let advance = draw_text(&mut canvas, &fonts.bold, 40.0, 4, 4, Rgba([255, 255, 255, 255]), "145");
        assert!(advance > 0.0);
        assert!((advance - text_width(&fonts.bold, 40.0, "145")).abs() < 1.0);
        assert!(canvas.pixels().any(|p| p[3] > 0));
    }
}
