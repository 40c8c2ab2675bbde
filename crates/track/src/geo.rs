//! Geographic helpers.
//!
//! FIT files store latitude/longitude as "semicircles": a signed 32-bit
//! fixed-point value where `2^31` corresponds to 180 degrees. Everything
//! downstream of the parser works in degrees.
//!
//! Distances and map projections use a local equirectangular projection
//! whose x axis is scaled by `cos(reference_latitude)`. Over the extent of
//! a single activity the error against a geodesic is negligible.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters spanned by one degree of latitude.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

const SEMICIRCLES_PER_HALF_TURN: f64 = 2_147_483_648.0; // 2^31

/// Convert FIT semicircles to degrees.
pub fn semicircles_to_degrees(semicircles: i32) -> f64 {
    semicircles as f64 * 180.0 / SEMICIRCLES_PER_HALF_TURN
}

/// Convert degrees to FIT semicircles, rounding to the nearest unit.
pub fn degrees_to_semicircles(degrees: f64) -> i32 {
    (degrees * SEMICIRCLES_PER_HALF_TURN / 180.0).round() as i32
}

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build from raw FIT semicircle values.
    pub fn from_semicircles(lat: i32, lon: i32) -> Self {
        Self {
            lat: semicircles_to_degrees(lat),
            lon: semicircles_to_degrees(lon),
        }
    }

    /// Linear interpolation in degree space.
    pub fn lerp(a: &GeoPoint, b: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: a.lat + (b.lat - a.lat) * t,
            lon: a.lon + (b.lon - a.lon) * t,
        }
    }

    /// Offset of `other` from `self` in meters: `(east, north)`.
    pub fn offset_to(&self, other: &GeoPoint) -> (f64, f64) {
        Equirectangular::new(self.lat).offset_m(self, other)
    }

    /// Planar distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (east, north) = self.offset_to(other);
        east.hypot(north)
    }

    /// Compass bearing from `self` to `other` in degrees, `[0, 360)`,
    /// clockwise from north.
    pub fn bearing_deg(&self, other: &GeoPoint) -> f64 {
        let (east, north) = self.offset_to(other);
        east.atan2(north).to_degrees().rem_euclid(360.0)
    }
}

/// Equirectangular projection around a reference latitude.
///
/// Plane coordinates are in "degrees of latitude": `y` is the latitude and
/// `x` is the longitude scaled by `cos(reference_latitude)`, so one plane
/// unit is the same distance on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equirectangular {
    reference_lat: f64,
    x_scale: f64,
}

impl Equirectangular {
    pub fn new(reference_lat: f64) -> Self {
        Self {
            reference_lat,
            x_scale: reference_lat.to_radians().cos(),
        }
    }

    pub fn reference_lat(&self) -> f64 {
        self.reference_lat
    }

    /// Project to plane coordinates `(x, y)`; `y` grows northwards.
    pub fn project(&self, p: &GeoPoint) -> (f64, f64) {
        (p.lon * self.x_scale, p.lat)
    }

    /// Offset of `p` from `origin` in meters: `(east, north)`.
    pub fn offset_m(&self, origin: &GeoPoint, p: &GeoPoint) -> (f64, f64) {
        let (ox, oy) = self.project(origin);
        let (px, py) = self.project(p);
        ((px - ox) * METERS_PER_DEGREE, (py - oy) * METERS_PER_DEGREE)
    }
}
