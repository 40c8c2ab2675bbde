//! Job timing utilities for progress reporting.
//!
//! Every job is anchored to a monotonic epoch captured when processing
//! starts. This module provides:
//! - The job clock (monotonic elapsed time plus wall-clock start)
//! - ETA estimation from completed/total work units
//! - Throttling of progress updates to whole-percent steps

use std::time::Instant;

/// A job clock that provides monotonic timing relative to the moment
/// processing started.
#[derive(Debug, Clone)]
pub struct JobClock {
    /// The instant processing started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl JobClock {
    /// Create a new job clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the job started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at job start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Remaining seconds, extrapolated from the average rate so far.
    pub fn eta_secs(&self, done: u64, total: u64) -> f64 {
        eta_secs(self.elapsed_secs(), done, total)
    }
}

/// Remaining time for `total - done` units at the observed rate.
///
/// Returns 0 until at least one unit has completed.
pub fn eta_secs(elapsed_secs: f64, done: u64, total: u64) -> f64 {
    if done == 0 || done >= total {
        return 0.0;
    }
    (elapsed_secs / done as f64 * (total - done) as f64).max(0.0)
}

/// Maps work-unit counts onto a percentage band and fires only when the
/// integer percentage advances.
#[derive(Debug)]
pub struct ProgressThrottle {
    start_pct: u8,
    end_pct: u8,
    last_pct: Option<u8>,
}

impl ProgressThrottle {
    /// Create a throttle that spreads progress across `[start_pct, end_pct]`.
    pub fn new(start_pct: u8, end_pct: u8) -> Self {
        let end_pct = end_pct.clamp(start_pct, 100);
        Self {
            start_pct,
            end_pct,
            last_pct: None,
        }
    }

    /// Percentage for `done` of `total` units within the band.
    pub fn percent(&self, done: u64, total: u64) -> u8 {
        if total == 0 {
            return self.end_pct;
        }
        let span = (self.end_pct - self.start_pct) as u64;
        let offset = (done.min(total) * span) / total;
        self.start_pct + offset as u8
    }

    /// Returns the new percentage if it advanced since the last call.
    /// The first call and the final unit always fire.
    pub fn advance(&mut self, done: u64, total: u64) -> Option<u8> {
        let pct = self.percent(done, total);
        let fire = match self.last_pct {
            None => true,
            Some(last) => pct > last || done == total,
        };
        if fire {
            self.last_pct = Some(pct);
            Some(pct)
        } else {
            None
        }
    }
}
