//! Sensor samples and the immutable, time-ordered track built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

use crate::geo::GeoPoint;

/// One sensor reading.
///
/// Every measurement is optional because devices and sessions omit fields
/// freely. Units: seconds since track start, bpm, m/s, steps/min,
/// cumulative meters, watts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since track start.
    pub timestamp: f64,
    /// Position in degrees.
    pub position: Option<GeoPoint>,
    /// Heart rate (bpm).
    pub heart_rate: Option<f64>,
    /// Speed (m/s).
    pub speed: Option<f64>,
    /// Cadence (steps/min).
    pub cadence: Option<f64>,
    /// Cumulative distance (m).
    pub distance: Option<f64>,
    /// Power (W).
    pub power: Option<f64>,
}

impl Sample {
    /// An empty sample at `timestamp`.
    pub fn at(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Linear interpolation between two samples.
    ///
    /// Numeric fields present on both sides are interpolated; a field
    /// missing on either side stays unset in the result.
    pub fn lerp(a: &Sample, b: &Sample, t: f64) -> Sample {
        fn mix(a: Option<f64>, b: Option<f64>, t: f64) -> Option<f64> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + (b - a) * t),
                _ => None,
            }
        }

        Sample {
            timestamp: a.timestamp + (b.timestamp - a.timestamp) * t,
            position: match (&a.position, &b.position) {
                (Some(pa), Some(pb)) => Some(GeoPoint::lerp(pa, pb, t)),
                _ => None,
            },
            heart_rate: mix(a.heart_rate, b.heart_rate, t),
            speed: mix(a.speed, b.speed, t),
            cadence: mix(a.cadence, b.cadence, t),
            distance: mix(a.distance, b.distance, t),
            power: mix(a.power, b.power, t),
        }
    }
}

/// An ordered sequence of samples, strictly ascending by timestamp.
///
/// Immutable once built; share it by reference across render workers.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    samples: Vec<Sample>,
    start_time: Option<DateTime<Utc>>,
}

/// Aggregate facts about a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub samples: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub distance_m: Option<f64>,
    pub gps_samples: usize,
    pub heart_rate_range: Option<(f64, f64)>,
    pub max_power: Option<f64>,
}

impl Track {
    /// Build a track from samples in any order.
    ///
    /// Samples are stably sorted by timestamp. When several samples share a
    /// timestamp the first one in input order is kept and the rest dropped.
    pub fn from_samples(samples: Vec<Sample>) -> FitoverlayResult<Self> {
        Self::with_start_time(samples, None)
    }

    /// Like [`Track::from_samples`], recording the absolute time of `t = 0`.
    pub fn with_start_time(
        mut samples: Vec<Sample>,
        start_time: Option<DateTime<Utc>>,
    ) -> FitoverlayResult<Self> {
        if let Some(bad) = samples.iter().find(|s| !s.timestamp.is_finite()) {
            return Err(FitoverlayError::parse(format!(
                "sample has non-finite timestamp {}",
                bad.timestamp
            )));
        }
        if samples.is_empty() {
            return Err(FitoverlayError::parse("track contains no timed records"));
        }

        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let before = samples.len();
        samples.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);
        if samples.len() != before {
            tracing::debug!(
                dropped = before - samples.len(),
                "Dropped samples with duplicate timestamps"
            );
        }

        Ok(Self {
            samples,
            start_time,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: a track holds at least one sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> &Sample {
        &self.samples[0]
    }

    pub fn last(&self) -> &Sample {
        &self.samples[self.samples.len() - 1]
    }

    /// Absolute time of `t = 0`, when the source recorded one.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn duration_secs(&self) -> f64 {
        self.last().timestamp - self.first().timestamp
    }

    /// Samples that carry a position, with their index in the track.
    pub fn positions(&self) -> impl Iterator<Item = (usize, GeoPoint)> + '_ {
        self.samples
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.position.map(|p| (i, p)))
    }

    pub fn has_positions(&self) -> bool {
        self.samples.iter().any(|s| s.position.is_some())
    }

    pub fn summary(&self) -> TrackSummary {
        let heart_rate_range = self
            .samples
            .iter()
            .filter_map(|s| s.heart_rate)
            .fold(None, |acc: Option<(f64, f64)>, hr| match acc {
                None => Some((hr, hr)),
                Some((lo, hi)) => Some((lo.min(hr), hi.max(hr))),
            });

        TrackSummary {
            samples: self.samples.len(),
            start_time: self.start_time,
            duration_secs: self.duration_secs(),
            distance_m: self.samples.iter().rev().find_map(|s| s.distance),
            gps_samples: self.positions().count(),
            heart_rate_range,
            max_power: self
                .samples
                .iter()
                .filter_map(|s| s.power)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |m| m.max(p)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hr_sample(t: f64, hr: f64) -> Sample {
        Sample {
            heart_rate: Some(hr),
            ..Sample::at(t)
        }
    }

    #[test]
    fn test_unsorted_samples_are_sorted() {
        let track = Track::from_samples(vec![
            hr_sample(3.0, 130.0),
            hr_sample(1.0, 110.0),
            hr_sample(2.0, 120.0),
            hr_sample(0.0, 100.0),
        ])
        .unwrap();

        let times: Vec<f64> = track.samples().iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_timestamp_keeps_first_occurrence() {
        let track = Track::from_samples(vec![
            hr_sample(1.0, 111.0),
            hr_sample(0.0, 100.0),
            hr_sample(1.0, 999.0),
        ])
        .unwrap();

        assert_eq!(track.len(), 2);
        assert_eq!(track.samples()[1].heart_rate, Some(111.0));
    }

    #[test]
    fn test_empty_track_is_parse_error() {
        let err = Track::from_samples(Vec::new()).unwrap_err();
        assert_eq!(err.stage(), "parse");
    }

    #[test]
    fn test_nan_timestamp_rejected() {
        assert!(Track::from_samples(vec![Sample::at(f64::NAN)]).is_err());
    }

    #[test]
    fn test_lerp_unsets_one_sided_fields() {
        let a = Sample {
            power: Some(200.0),
            ..hr_sample(0.0, 100.0)
        };
        let b = hr_sample(10.0, 120.0);
        let mid = Sample::lerp(&a, &b, 0.5);
        assert_eq!(mid.timestamp, 5.0);
        assert_eq!(mid.heart_rate, Some(110.0));
        assert_eq!(mid.power, None);
    }

    #[test]
    fn test_summary() {
        let track = Track::from_samples(vec![
            Sample {
                distance: Some(0.0),
                position: Some(GeoPoint::new(47.0, 8.0)),
                ..hr_sample(0.0, 120.0)
            },
            Sample {
                distance: Some(42.0),
                ..hr_sample(10.0, 150.0)
            },
        ])
        .unwrap();

        let summary = track.summary();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.duration_secs, 10.0);
        assert_eq!(summary.distance_m, Some(42.0));
        assert_eq!(summary.gps_samples, 1);
        assert_eq!(summary.heart_rate_range, Some((120.0, 150.0)));
        assert_eq!(summary.max_power, None);
    }
}
