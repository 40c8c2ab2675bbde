//! FIT activity file decoding.
//!
//! Walks the `record` messages of a FIT file and keeps only the fields the
//! overlay understands. Unknown or absent fields leave the corresponding
//! sample field unset; they never fail the parse.

use std::path::Path;

use chrono::{DateTime, Utc};
use fitparser::profile::MesgNum;
use fitparser::Value;

use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

use crate::geo::GeoPoint;
use crate::sample::{Sample, Track};

/// Knobs for interpreting record fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseOptions {
    /// Multiplier from FIT cadence (per-leg RPM for running) to the
    /// cadence stored on [`Sample`].
    pub cadence_scale: f64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { cadence_scale: 2.0 }
    }
}

/// Parse a FIT file from disk.
pub fn parse_fit_file(path: &Path, options: &ParseOptions) -> FitoverlayResult<Track> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FitoverlayError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => FitoverlayError::Io(e),
    })?;
    let track = parse_fit_bytes(&bytes, options)?;
    tracing::info!(
        path = %path.display(),
        samples = track.len(),
        duration_secs = track.duration_secs(),
        "Parsed FIT track"
    );
    Ok(track)
}

/// Parse an in-memory FIT file.
///
/// Fails with a parse error when the bytes are not a FIT file, are
/// truncated or fail their CRC, or contain no timestamped records.
pub fn parse_fit_bytes(bytes: &[u8], options: &ParseOptions) -> FitoverlayResult<Track> {
    let records = fitparser::de::from_bytes(bytes)
        .map_err(|e| FitoverlayError::parse(format!("not a readable FIT file: {e}")))?;

    let mut rows: Vec<(DateTime<Utc>, Sample)> = Vec::new();
    for record in records.into_iter() {
        if record.kind() != MesgNum::Record {
            continue;
        }

        let mut timestamp: Option<DateTime<Utc>> = None;
        let mut row = RecordFields::default();
        for field in record.fields() {
            let value = field.value();
            match field.name() {
                "timestamp" => {
                    if let Value::Timestamp(ts) = value {
                        timestamp = Some(ts.with_timezone(&Utc));
                    }
                }
                "position_lat" => row.lat = fit_value_to_i32(value),
                "position_long" => row.lon = fit_value_to_i32(value),
                "heart_rate" => row.heart_rate = fit_value_to_f64(value),
                "speed" => {
                    if row.speed.is_none() {
                        row.speed = fit_value_to_f64(value);
                    }
                }
                "enhanced_speed" => {
                    if let Some(v) = fit_value_to_f64(value) {
                        row.speed = Some(v);
                    }
                }
                "distance" => {
                    if row.distance.is_none() {
                        row.distance = fit_value_to_f64(value);
                    }
                }
                "enhanced_distance" => {
                    if let Some(v) = fit_value_to_f64(value) {
                        row.distance = Some(v);
                    }
                }
                "cadence" => row.cadence = fit_value_to_f64(value),
                "fractional_cadence" => row.fractional_cadence = fit_value_to_f64(value),
                "power" => row.power = fit_value_to_f64(value),
                _ => {}
            }
        }

        if let Some(ts) = timestamp {
            rows.push((ts, row.into_sample(options)));
        }
    }

    let Some(t0) = rows.iter().map(|(ts, _)| *ts).min() else {
        return Err(FitoverlayError::parse(
            "FIT file contains no timestamped records",
        ));
    };

    let samples = rows
        .into_iter()
        .map(|(ts, mut sample)| {
            sample.timestamp = (ts - t0).num_milliseconds() as f64 / 1000.0;
            sample
        })
        .collect();

    Track::with_start_time(samples, Some(t0))
}

#[derive(Debug, Default)]
struct RecordFields {
    lat: Option<i32>,
    lon: Option<i32>,
    heart_rate: Option<f64>,
    speed: Option<f64>,
    cadence: Option<f64>,
    fractional_cadence: Option<f64>,
    distance: Option<f64>,
    power: Option<f64>,
}

impl RecordFields {
    fn into_sample(self, options: &ParseOptions) -> Sample {
        let position = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::from_semicircles(lat, lon)),
            _ => None,
        };
        let cadence = self
            .cadence
            .map(|c| (c + self.fractional_cadence.unwrap_or(0.0)) * options.cadence_scale);

        Sample {
            timestamp: 0.0,
            position,
            heart_rate: self.heart_rate,
            speed: self.speed,
            cadence,
            distance: self.distance,
            power: self.power,
        }
    }
}

fn fit_value_to_i32(value: &Value) -> Option<i32> {
    match value {
        Value::SInt32(v) => Some(*v),
        Value::SInt64(v) => i32::try_from(*v).ok(),
        Value::UInt32(v) => i32::try_from(*v).ok(),
        _ => None,
    }
}

fn fit_value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        Value::SInt16(v) => Some(*v as f64),
        Value::UInt16(v) => Some(*v as f64),
        Value::SInt32(v) => Some(*v as f64),
        Value::UInt32(v) => Some(*v as f64),
        Value::SInt64(v) => Some(*v as f64),
        Value::UInt64(v) => Some(*v as f64),
        Value::UInt16z(v) => Some(*v as f64),
        Value::UInt32z(v) => Some(*v as f64),
        Value::UInt64z(v) => Some(*v as f64),
        Value::Byte(v) => Some(*v as f64),
        Value::UInt8(v) => Some(*v as f64),
        Value::UInt8z(v) => Some(*v as f64),
        Value::SInt8(v) => Some(*v as f64),
        Value::Array(values) => values.iter().find_map(fit_value_to_f64),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{encode_fit, steady_run};

    #[test]
    fn test_garbage_is_parse_error() {
        let err = parse_fit_bytes(b"definitely not a fit file", &ParseOptions::default())
            .unwrap_err();
        assert_eq!(err.stage(), "parse");
    }

    #[test]
    fn test_truncated_file_is_parse_error() {
        let bytes = encode_fit(&steady_run(10, 140.0), 1_000_000_000);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(parse_fit_bytes(truncated, &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = parse_fit_file(
            Path::new("/definitely/not/here.fit"),
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FitoverlayError::FileNotFound { .. }));
    }

    #[test]
    fn test_value_conversion_rejects_non_numeric() {
        assert_eq!(fit_value_to_f64(&Value::UInt8(140)), Some(140.0));
        assert_eq!(fit_value_to_f64(&Value::String("x".into())), None);
        assert_eq!(fit_value_to_i32(&Value::SInt32(-5)), Some(-5));
    }
}
