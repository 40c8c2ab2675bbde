//! Local minimap: a circular radar view of fixed real-world radius centred
//! on the athlete.

use image::{Rgba, RgbaImage};

use fitoverlay_common::config::MinimapOrientation;
use fitoverlay_track::geo::Equirectangular;
use fitoverlay_track::{GeoPoint, Track};

use crate::draw::{disc, mask_circle, ring, thick_line, TRAVELLED, WHITE};
use crate::layout::{OverlayLayout, Square};

/// Real-world distance from the centre to the edge of the minimap.
pub const MINIMAP_RADIUS_M: f64 = 100.0;

/// Slack on the radius test for points that sit on the edge.
const EDGE_TOLERANCE_M: f64 = 1e-6;

const BACKDROP: Rgba<u8> = Rgba([0, 0, 0, 120]);
const RIM: Rgba<u8> = Rgba([255, 255, 255, 150]);

/// Projection from positions to minimap pixels.
///
/// Coordinates are local to the minimap square; the centre position lands
/// on the square's centre and [`MINIMAP_RADIUS_M`] lands on its inscribed
/// circle. A rotation of `rotation_deg` turns that bearing to the top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimapProjection {
    center: GeoPoint,
    projection: Equirectangular,
    radius_px: f64,
    meters_per_px: f64,
    sin: f64,
    cos: f64,
}

impl MinimapProjection {
    pub fn new(center: GeoPoint, diameter_px: u32, rotation_deg: f64) -> Self {
        let radius_px = diameter_px as f64 / 2.0;
        let rotation = rotation_deg.to_radians();
        Self {
            center,
            projection: Equirectangular::new(center.lat),
            radius_px,
            meters_per_px: MINIMAP_RADIUS_M / radius_px.max(f64::MIN_POSITIVE),
            sin: rotation.sin(),
            cos: rotation.cos(),
        }
    }

    pub fn radius_px(&self) -> f64 {
        self.radius_px
    }

    /// Pixel position of `p`, or `None` when it lies beyond the radius.
    pub fn project(&self, p: &GeoPoint) -> Option<(f64, f64)> {
        let (east, north) = self.projection.offset_m(&self.center, p);
        if east.hypot(north) > MINIMAP_RADIUS_M + EDGE_TOLERANCE_M {
            return None;
        }
        let x = east * self.cos - north * self.sin;
        let y = east * self.sin + north * self.cos;
        Some((
            self.radius_px + x / self.meters_per_px,
            self.radius_px - y / self.meters_per_px,
        ))
    }
}

/// Segment colour and geometry for one drawn piece of the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimapSegment {
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub travelled: bool,
}

/// Route segments whose endpoints both lie inside the minimap.
///
/// Consecutive samples form a segment; a sample without a position breaks
/// the route. Segments ending at or before `current_index` are travelled.
pub fn visible_segments(track: &Track, projection: &MinimapProjection, current_index: usize) -> Vec<MinimapSegment> {
    let mut segments = Vec::new();
    let mut prev: Option<(f64, f64)> = None;
    for (i, sample) in track.samples().iter().enumerate() {
        let here = sample.position.as_ref().and_then(|p| projection.project(p));
        if let (Some(from), Some(to)) = (prev, here) {
            segments.push(MinimapSegment {
                from,
                to,
                travelled: i <= current_index,
            });
        }
        prev = here;
    }
    segments
}

/// Render the minimap for the athlete at `position`.
///
/// `heading` is only used for [`MinimapOrientation::HeadingUp`]; without a
/// heading (standing still) the map stays north-up.
pub fn draw_minimap(
    canvas: &mut RgbaImage,
    layout: &OverlayLayout,
    track: &Track,
    position: &GeoPoint,
    current_index: usize,
    orientation: MinimapOrientation,
    heading: Option<f64>,
) {
    let Square { x, y, size } = layout.minimap;
    if size == 0 {
        return;
    }
    let rotation = match orientation {
        MinimapOrientation::NorthUp => 0.0,
        MinimapOrientation::HeadingUp => heading.unwrap_or(0.0),
    };
    let projection = MinimapProjection::new(*position, size, rotation);

    let s = size as f64;
    let line_width = (s * 0.01).max(layout.stroke(2.0) as f64) as f32;
    let dot_radius = (s * 0.03).max(layout.stroke(6.0) as f64);
    let rim_width = layout.stroke(2.0);

    let mut map = RgbaImage::from_pixel(size, size, BACKDROP);
    for seg in visible_segments(track, &projection, current_index) {
        let color = if seg.travelled { TRAVELLED } else { WHITE };
        thick_line(&mut map, seg.from, seg.to, line_width, color);
    }
    mask_circle(&mut map);

    let center = (projection.radius_px(), projection.radius_px());
    disc(&mut map, center, dot_radius, WHITE);
    ring(&mut map, center, projection.radius_px() - 1.0, rim_width, RIM);

    image::imageops::overlay(canvas, &map, x, y);
}
