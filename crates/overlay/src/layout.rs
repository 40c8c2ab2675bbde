//! Resolution-independent overlay geometry.
//!
//! All sizes are fixed fractions of `min(width, height)`; stroke widths and
//! marker radii scale linearly with `min(width, height) / 1080`.

/// Short side, in pixels, that the unscaled stroke widths were tuned for.
pub const REFERENCE_DIMENSION: f64 = 1080.0;

const FONT_FRACTION: f64 = 0.05;
const SMALL_FONT_FRACTION: f64 = 0.035;
const MARGIN_FRACTION: f64 = 0.03;
const PADDING_FRACTION: f64 = 0.025;
const ROUTE_MAP_FRACTION: f64 = 0.5;
const MINIMAP_FRACTION: f64 = 0.3;

/// An axis-aligned square region of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Square {
    pub x: i64,
    pub y: i64,
    pub size: u32,
}

impl Square {
    pub fn center(&self) -> (f64, f64) {
        let half = self.size as f64 / 2.0;
        (self.x as f64 + half, self.y as f64 + half)
    }
}

/// Pixel geometry for one output resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    pub width: u32,
    pub height: u32,
    /// `min(width, height)`.
    pub base: f64,
    /// `base / REFERENCE_DIMENSION`.
    pub scale: f64,
    pub font_px: f32,
    pub small_font_px: f32,
    pub margin: i64,
    pub padding: i64,
    pub line_height: i64,
    pub route_map: Square,
    pub minimap: Square,
}

impl OverlayLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let base = width.min(height) as f64;
        let scale = base / REFERENCE_DIMENSION;
        let margin = (base * MARGIN_FRACTION) as i64;
        let font_px = (base * FONT_FRACTION) as f32;

        let map_size = (base * ROUTE_MAP_FRACTION) as u32;
        let mini_size = (base * MINIMAP_FRACTION) as u32;

        Self {
            width,
            height,
            base,
            scale,
            font_px,
            small_font_px: (base * SMALL_FONT_FRACTION) as f32,
            margin,
            padding: (base * PADDING_FRACTION) as i64,
            line_height: (font_px as f64 * 1.3) as i64,
            route_map: Square {
                x: width as i64 - map_size as i64 - margin,
                y: margin,
                size: map_size,
            },
            minimap: Square {
                x: width as i64 - mini_size as i64 - margin,
                y: height as i64 - mini_size as i64 - margin,
                size: mini_size,
            },
        }
    }

    /// A stroke width given in reference pixels, at least one pixel.
    pub fn stroke(&self, reference_px: f64) -> f32 {
        (reference_px * self.scale).max(1.0) as f32
    }

    /// Top-left corner of the data panel's first text line.
    pub fn panel_origin(&self) -> (i64, i64) {
        (self.margin + self.padding, self.margin + self.padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_1080p() {
        let layout = OverlayLayout::new(1920, 1080);
        assert_eq!(layout.scale, 1.0);
        assert_eq!(layout.margin, 32);
        assert_eq!(layout.route_map.size, 540);
        assert_eq!(layout.route_map.x, 1920 - 540 - 32);
        assert_eq!(layout.minimap.size, 324);
        assert_eq!(layout.minimap.y, 1080 - 324 - 32);
    }

    #[test]
    fn test_layout_scales_with_short_side() {
        let landscape = OverlayLayout::new(1280, 720);
        let portrait = OverlayLayout::new(720, 1280);
        assert_eq!(landscape.route_map.size, portrait.route_map.size);
        assert_eq!(landscape.font_px, portrait.font_px);
        assert!((landscape.stroke(3.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_stroke_never_below_one_pixel() {
        let tiny = OverlayLayout::new(64, 36);
        assert_eq!(tiny.stroke(3.0), 1.0);
    }
}
