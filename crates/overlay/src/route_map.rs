//! Global route map: the whole route, the travelled part, start and current
//! position markers.
//!
//! The full route is timestamp-independent, so it is drawn once per job into
//! a cached base layer; per frame only the travelled overdraw and markers
//! are added.

use image::RgbaImage;

use fitoverlay_track::geo::Equirectangular;
use fitoverlay_track::{GeoPoint, Track};

use crate::draw::{disc, polyline, TRAVELLED, WHITE};
use crate::layout::{OverlayLayout, Square};

/// Empty border around the route, as a fraction of the map size.
const MARGIN_FRACTION: f64 = 0.04;

/// Maps geographic positions onto a square canvas of `size` pixels.
///
/// The route's bounding box is fitted into the canvas with its aspect ratio
/// preserved and centred along the shorter axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteProjection {
    projection: Equirectangular,
    min_x: f64,
    max_y: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl RouteProjection {
    /// Fit `points` into a `size` pixel square. `None` without points.
    pub fn fit(points: &[GeoPoint], size: u32) -> Option<Self> {
        let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
        }
        if !min_lat.is_finite() {
            return None;
        }

        let projection = Equirectangular::new((min_lat + max_lat) / 2.0);
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            let (x, y) = projection.project(p);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }

        let size = size as f64;
        let inner = size * (1.0 - 2.0 * MARGIN_FRACTION);
        let (span_x, span_y) = (max_x - min_x, max_y - min_y);
        let span = span_x.max(span_y);
        // A single point (or a perfectly still recording) sits in the middle.
        let scale = if span > 0.0 { inner / span } else { 0.0 };

        Some(Self {
            projection,
            min_x,
            max_y,
            scale,
            offset_x: (size - span_x * scale) / 2.0,
            offset_y: (size - span_y * scale) / 2.0,
        })
    }

    /// Canvas-local pixel position of `p`.
    pub fn to_pixel(&self, p: &GeoPoint) -> (f64, f64) {
        let (x, y) = self.projection.project(p);
        (
            self.offset_x + (x - self.min_x) * self.scale,
            self.offset_y + (self.max_y - y) * self.scale,
        )
    }
}

/// Route map with its cached base layer.
#[derive(Debug, Clone)]
pub struct RouteMap {
    square: Square,
    projection: RouteProjection,
    /// Projected position per track sample index.
    pixels: Vec<Option<(f64, f64)>>,
    base: RgbaImage,
    travelled_width: f32,
    marker_radius: f64,
}

impl RouteMap {
    /// Build the map for `track`. `None` when the track has no positions.
    pub fn new(track: &Track, layout: &OverlayLayout) -> Option<Self> {
        let square = layout.route_map;
        let positions: Vec<GeoPoint> = track.positions().map(|(_, p)| p).collect();
        let projection = RouteProjection::fit(&positions, square.size)?;

        let pixels: Vec<Option<(f64, f64)>> = track
            .samples()
            .iter()
            .map(|s| s.position.as_ref().map(|p| projection.to_pixel(p)))
            .collect();

        let size = square.size as f64;
        let route_width = (size * 0.008).max(layout.stroke(3.0) as f64) as f32;
        let travelled_width = (size * 0.012).max(layout.stroke(5.0) as f64) as f32;
        let marker_radius = (size * 0.02).max(layout.stroke(12.0) as f64);

        let mut base = RgbaImage::new(square.size, square.size);
        let route: Vec<(f64, f64)> = pixels.iter().flatten().copied().collect();
        polyline(&mut base, &route, route_width, WHITE);

        tracing::debug!(
            size = square.size,
            points = route.len(),
            "Route map base layer rendered"
        );

        Some(Self {
            square,
            projection,
            pixels,
            base,
            travelled_width,
            marker_radius,
        })
    }

    pub fn projection(&self) -> &RouteProjection {
        &self.projection
    }

    pub fn square(&self) -> Square {
        self.square
    }

    /// Draw the map for a frame whose aligned sample sits after track index
    /// `current_index`, at `position` if known.
    pub fn draw(&self, canvas: &mut RgbaImage, current_index: usize, position: Option<&GeoPoint>) {
        image::imageops::overlay(canvas, &self.base, self.square.x, self.square.y);

        let (ox, oy) = (self.square.x as f64, self.square.y as f64);
        let to_canvas = |(x, y): (f64, f64)| (x + ox, y + oy);

        let end = (current_index + 1).min(self.pixels.len());
        let mut travelled: Vec<(f64, f64)> = self.pixels[..end]
            .iter()
            .flatten()
            .copied()
            .map(to_canvas)
            .collect();
        let current = position
            .map(|p| to_canvas(self.projection.to_pixel(p)))
            .or_else(|| travelled.last().copied());
        if let (Some(cur), Some(_)) = (current, travelled.last()) {
            travelled.push(cur);
        }
        polyline(canvas, &travelled, self.travelled_width, TRAVELLED);

        if let Some(start) = self.pixels.iter().flatten().next() {
            disc(canvas, to_canvas(*start), self.marker_radius, WHITE);
        }
        if let Some(cur) = current {
            disc(canvas, cur, self.marker_radius, WHITE);
        }
    }
}
