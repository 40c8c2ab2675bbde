//! Time alignment between video frames and the sensor track.
//!
//! Video time `t = 0` corresponds to track time `offset`. Queries locate the
//! bracketing samples by binary search and interpolate linearly between
//! them; queries outside the track clamp to the nearest boundary sample.

use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

use crate::sample::{Sample, Track};

/// Half-width of the distance window used to derive pace.
pub const PACE_HALF_WINDOW_SECS: f64 = 3.0;

/// Half-width of the position window used to derive heading.
pub const HEADING_HALF_WINDOW_SECS: f64 = 2.0;

/// Below this speed (m/s) the athlete is considered stationary.
const MIN_MOVING_SPEED: f64 = 0.3;

/// Minimum displacement (m) for a meaningful heading.
const MIN_HEADING_DISPLACEMENT_M: f64 = 1.0;

/// An interpolated sample plus where it sits in the track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedSample {
    /// Interpolated sensor state.
    pub sample: Sample,
    /// Index of the last track sample at or before the query time.
    pub index: usize,
    /// Whether the query fell outside the track and was clamped.
    pub clamped: bool,
}

/// Maps video-relative time onto the track.
#[derive(Debug, Clone, Copy)]
pub struct TimeAligner<'a> {
    track: &'a Track,
    offset: f64,
}

impl<'a> TimeAligner<'a> {
    pub fn new(track: &'a Track, offset_secs: f64) -> Self {
        Self {
            track,
            offset: offset_secs,
        }
    }

    pub fn track(&self) -> &'a Track {
        self.track
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Track time for a video time.
    pub fn track_time(&self, video_secs: f64) -> f64 {
        self.offset + video_secs
    }

    /// Sensor state at video time `video_secs`.
    pub fn sample_at(&self, video_secs: f64) -> AlignedSample {
        self.sample_at_track_time(self.track_time(video_secs))
    }

    /// Sensor state at absolute track time `t`.
    pub fn sample_at_track_time(&self, t: f64) -> AlignedSample {
        let samples = self.track.samples();
        let upper = samples.partition_point(|s| s.timestamp <= t);

        if upper == 0 {
            return AlignedSample {
                sample: samples[0],
                index: 0,
                clamped: t < samples[0].timestamp,
            };
        }
        let lower = upper - 1;
        let lo = &samples[lower];
        if upper == samples.len() || lo.timestamp == t {
            return AlignedSample {
                sample: *lo,
                index: lower,
                clamped: t > lo.timestamp,
            };
        }

        let hi = &samples[upper];
        let frac = (t - lo.timestamp) / (hi.timestamp - lo.timestamp);
        AlignedSample {
            sample: Sample::lerp(lo, hi, frac),
            index: lower,
            clamped: false,
        }
    }

    /// Pace in seconds per kilometer at video time `video_secs`.
    ///
    /// Derived from the distance covered over a short window centred on the
    /// query; falls back to the speed field when distance is not recorded.
    /// `None` while stationary.
    pub fn pace_at(&self, video_secs: f64) -> Option<f64> {
        let t = self.track_time(video_secs);
        let (t0, t1) = self.window(t, PACE_HALF_WINDOW_SECS);
        let d0 = self.sample_at_track_time(t0).sample.distance;
        let d1 = self.sample_at_track_time(t1).sample.distance;

        match (d0, d1) {
            (Some(d0), Some(d1)) if t1 > t0 => {
                let speed = (d1 - d0) / (t1 - t0);
                (speed >= MIN_MOVING_SPEED).then(|| 1000.0 / speed)
            }
            _ => self
                .sample_at_track_time(t)
                .sample
                .speed
                .filter(|v| *v >= MIN_MOVING_SPEED)
                .map(|v| 1000.0 / v),
        }
    }

    /// Direction of travel in degrees clockwise from north, if moving.
    pub fn heading_at(&self, video_secs: f64) -> Option<f64> {
        let t = self.track_time(video_secs);
        let (t0, t1) = self.window(t, HEADING_HALF_WINDOW_SECS);
        let p0 = self.sample_at_track_time(t0).sample.position?;
        let p1 = self.sample_at_track_time(t1).sample.position?;
        (p0.distance_m(&p1) >= MIN_HEADING_DISPLACEMENT_M).then(|| p0.bearing_deg(&p1))
    }

    fn window(&self, t: f64, half: f64) -> (f64, f64) {
        let start = self.track.first().timestamp;
        let end = self.track.last().timestamp;
        let t = t.clamp(start, end);
        ((t - half).max(start), (t + half).min(end))
    }
}

/// Check, once before any frame work, that the video overlaps the track.
///
/// The video covers track time `[offset, offset + duration]`. Partial
/// overlap is fine: per-frame queries clamp. No overlap at all is an error.
pub fn validate_coverage(track: &Track, offset_secs: f64, duration_secs: f64) -> FitoverlayResult<()> {
    if !offset_secs.is_finite() || !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(FitoverlayError::alignment(format!(
            "invalid video range: offset {offset_secs}s, duration {duration_secs}s"
        )));
    }

    let start = track.first().timestamp;
    let end = track.last().timestamp;
    let video_end = offset_secs + duration_secs;
    if video_end < start || offset_secs > end {
        return Err(FitoverlayError::alignment(format!(
            "video covers track time {offset_secs:.1}s..{video_end:.1}s but the track spans {start:.1}s..{end:.1}s"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    fn two_point_track() -> Track {
        Track::from_samples(vec![
            Sample {
                heart_rate: Some(60.0),
                ..Sample::at(0.0)
            },
            Sample {
                heart_rate: Some(80.0),
                ..Sample::at(10.0)
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_interpolates_between_brackets() {
        let track = two_point_track();
        let aligner = TimeAligner::new(&track, 0.0);
        let aligned = aligner.sample_at(5.0);
        assert_eq!(aligned.sample.heart_rate, Some(70.0));
        assert_eq!(aligned.index, 0);
        assert!(!aligned.clamped);
    }

    #[test]
    fn test_clamps_outside_track() {
        let track = two_point_track();
        let aligner = TimeAligner::new(&track, 0.0);

        let before = aligner.sample_at(-5.0);
        assert_eq!(before.sample.heart_rate, Some(60.0));
        assert!(before.clamped);

        let after = aligner.sample_at(15.0);
        assert_eq!(after.sample.heart_rate, Some(80.0));
        assert_eq!(after.index, 1);
        assert!(after.clamped);
    }

    #[test]
    fn test_offset_shifts_query() {
        let track = two_point_track();
        let aligner = TimeAligner::new(&track, 2.5);
        assert_eq!(aligner.sample_at(2.5).sample.heart_rate, Some(70.0));
    }

    #[test]
    fn test_exact_hit_returns_sample_even_if_neighbor_lacks_field() {
        let track = Track::from_samples(vec![
            Sample {
                power: Some(300.0),
                ..Sample::at(0.0)
            },
            Sample::at(1.0),
        ])
        .unwrap();
        let aligner = TimeAligner::new(&track, 0.0);
        assert_eq!(aligner.sample_at(0.0).sample.power, Some(300.0));
        assert_eq!(aligner.sample_at(0.5).sample.power, None);
    }

    #[test]
    fn test_position_interpolates_linearly() {
        let track = Track::from_samples(vec![
            Sample {
                position: Some(GeoPoint::new(47.0, 8.0)),
                ..Sample::at(0.0)
            },
            Sample {
                position: Some(GeoPoint::new(47.002, 8.004)),
                ..Sample::at(2.0)
            },
        ])
        .unwrap();
        let p = TimeAligner::new(&track, 0.0)
            .sample_at(1.0)
            .sample
            .position
            .unwrap();
        assert!((p.lat - 47.001).abs() < 1e-12);
        assert!((p.lon - 8.002).abs() < 1e-12);
    }

    #[test]
    fn test_pace_from_distance_window() {
        // 4 m/s -> 250 s/km
        let samples = (0..=20)
            .map(|i| Sample {
                distance: Some(i as f64 * 4.0),
                ..Sample::at(i as f64)
            })
            .collect();
        let track = Track::from_samples(samples).unwrap();
        let pace = TimeAligner::new(&track, 0.0).pace_at(10.0).unwrap();
        assert!((pace - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_pace_falls_back_to_speed_and_detects_standstill() {
        let track = Track::from_samples(vec![
            Sample {
                speed: Some(2.0),
                ..Sample::at(0.0)
            },
            Sample {
                speed: Some(2.0),
                ..Sample::at(10.0)
            },
        ])
        .unwrap();
        let pace = TimeAligner::new(&track, 0.0).pace_at(5.0).unwrap();
        assert!((pace - 500.0).abs() < 1e-9);

        let still = Track::from_samples(vec![
            Sample {
                distance: Some(100.0),
                ..Sample::at(0.0)
            },
            Sample {
                distance: Some(100.0),
                ..Sample::at(10.0)
            },
        ])
        .unwrap();
        assert_eq!(TimeAligner::new(&still, 0.0).pace_at(5.0), None);
    }

    #[test]
    fn test_heading_east() {
        let track = Track::from_samples(vec![
            Sample {
                position: Some(GeoPoint::new(47.0, 8.0)),
                ..Sample::at(0.0)
            },
            Sample {
                position: Some(GeoPoint::new(47.0, 8.001)),
                ..Sample::at(10.0)
            },
        ])
        .unwrap();
        let heading = TimeAligner::new(&track, 0.0).heading_at(5.0).unwrap();
        assert!((heading - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_validation() {
        let track = two_point_track();
        assert!(validate_coverage(&track, 0.0, 30.0).is_ok());
        assert!(validate_coverage(&track, -5.0, 6.0).is_ok()); // partial overlap
        assert!(validate_coverage(&track, 11.0, 5.0).is_err());
        assert!(validate_coverage(&track, -20.0, 5.0).is_err());

        let err = validate_coverage(&track, 100.0, 5.0).unwrap_err();
        assert_eq!(err.stage(), "align");
    }
}
