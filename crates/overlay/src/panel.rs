//! Data panel: one line per available metric, icon + value + unit.

use image::{Rgba, RgbaImage};

use fitoverlay_track::Sample;

use crate::layout::OverlayLayout;
use crate::text::{draw_text, FontSet};

const VALUE_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const UNIT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 200]);

/// Shown in place of a pace while the athlete is not moving.
pub const STATIONARY_PACE: &str = "--:--";

/// One rendered panel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLine {
    pub icon: &'static str,
    pub value: String,
    pub unit: &'static str,
}

impl PanelLine {
    fn new(icon: &'static str, value: String, unit: &'static str) -> Self {
        Self { icon, value, unit }
    }

    /// Bold part of the row: icon and value.
    pub fn head(&self) -> String {
        format!("{} {}", self.icon, self.value)
    }
}

/// Rows for one sample. Metrics without data are omitted.
///
/// `pace_secs_per_km` is the derived pace; the pace row is present whenever
/// the sample carries distance or speed and shows [`STATIONARY_PACE`] when no
/// pace could be derived.
pub fn panel_lines(sample: &Sample, pace_secs_per_km: Option<f64>) -> Vec<PanelLine> {
    let mut lines = Vec::with_capacity(5);

    if let Some(hr) = sample.heart_rate {
        lines.push(PanelLine::new("♥", format_integer(hr), "bpm"));
    }
    if sample.distance.is_some() || sample.speed.is_some() {
        let pace = pace_secs_per_km
            .map(format_pace)
            .unwrap_or_else(|| STATIONARY_PACE.to_string());
        lines.push(PanelLine::new("⚡", pace, "/km"));
    }
    if let Some(cadence) = sample.cadence {
        lines.push(PanelLine::new("⟳", format_integer(cadence), "spm"));
    }
    if let Some(distance) = sample.distance {
        lines.push(PanelLine::new("⊙", format_km(distance), "km"));
    }
    if let Some(power) = sample.power {
        lines.push(PanelLine::new("⚙", format_integer(power), "W"));
    }
    lines
}

/// Nearest integer, halves rounded away from zero.
pub fn format_integer(value: f64) -> String {
    format!("{}", value.round() as i64)
}

/// Meters as kilometers with two decimals.
pub fn format_km(meters: f64) -> String {
    let hundredths = (meters / 10.0).round() as i64;
    format!("{}.{:02}", hundredths / 100, (hundredths % 100).abs())
}

/// Seconds per kilometer as `m:ss`.
pub fn format_pace(secs_per_km: f64) -> String {
    if !secs_per_km.is_finite() || secs_per_km <= 0.0 {
        return STATIONARY_PACE.to_string();
    }
    let total = secs_per_km.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Draw the rows at the panel origin.
pub fn draw_panel(canvas: &mut RgbaImage, layout: &OverlayLayout, fonts: &FontSet, lines: &[PanelLine]) {
    let (x, mut y) = layout.panel_origin();
    let unit_gap = (layout.font_px * 0.1).round().max(1.0) as i64;
    let unit_drop = (layout.font_px * 0.15) as i64;

    for line in lines {
        let width = draw_text(canvas, &fonts.bold, layout.font_px, x, y, VALUE_COLOR, &line.head());
        draw_text(
            canvas,
            &fonts.regular,
            layout.small_font_px,
            x + width.ceil() as i64 + unit_gap,
            y + unit_drop,
            UNIT_COLOR,
            line.unit,
        );
        y += layout.line_height;
    }
}
