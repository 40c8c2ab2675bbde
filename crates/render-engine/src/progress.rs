//! Progress reporting interface.

/// Pipeline stage checkpoints, in percent.
pub mod checkpoint {
    pub const PARSE: u8 = 0;
    pub const PROBE: u8 = 5;
    pub const RENDER_START: u8 = 10;
    pub const FINALIZE: u8 = 95;
    pub const COMPLETE: u8 = 100;
}

/// Receives `(percent, message)` updates from a running job.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// frame drain loop.
pub trait ProgressReporter: Sync {
    fn report(&self, progress: u8, message: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(u8, &str) + Sync,
{
    fn report(&self, progress: u8, message: &str) {
        self(progress, message)
    }
}

/// Reporter that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: u8, _message: &str) {}
}

/// Reporter that forwards updates to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, progress: u8, message: &str) {
        tracing::info!(progress, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = |p: u8, m: &str| seen.lock().unwrap().push((p, m.to_string()));
        reporter.report(5, "probing");
        reporter.report(100, "done");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(5, "probing".to_string()), (100, "done".to_string())]
        );
    }
}
