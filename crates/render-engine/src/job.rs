//! Per-job state and cancellation.
//!
//! A [`JobContext`] is the explicit, per-job replacement for a process-wide
//! status table: the caller creates one, passes it to [`run_job`] as the
//! progress reporter and polls [`JobContext::snapshot`] however it likes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

use crate::progress::ProgressReporter;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> FitoverlayResult<()> {
        if self.is_cancelled() {
            Err(FitoverlayError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Error,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub output_path: Option<PathBuf>,
    /// Failing stage when `status` is `error`.
    pub error_stage: Option<String>,
    /// Failing frame for render errors.
    pub error_frame: Option<u64>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
            message: "Queued".to_string(),
            output_path: None,
            error_stage: None,
            error_frame: None,
        }
    }
}

/// Mutable state of one job, updated through [`ProgressReporter`].
#[derive(Debug, Default)]
pub struct JobContext {
    state: Mutex<JobState>,
    cancel: CancelToken,
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> JobState {
        self.lock().clone()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn start(&self) {
        let mut state = self.lock();
        state.status = JobStatus::Running;
        state.message = "Starting".to_string();
    }

    fn complete(&self, output: PathBuf) {
        let mut state = self.lock();
        state.status = JobStatus::Completed;
        state.progress = 100;
        state.message = format!("Done: {}", output.display());
        state.output_path = Some(output);
    }

    fn fail(&self, err: &FitoverlayError) {
        let mut state = self.lock();
        state.status = JobStatus::Error;
        state.message = err.to_string();
        state.error_stage = Some(err.stage().to_string());
        state.error_frame = err.frame_index();
    }
}

impl ProgressReporter for JobContext {
    fn report(&self, progress: u8, message: &str) {
        let mut state = self.lock();
        if state.status == JobStatus::Queued {
            state.status = JobStatus::Running;
        }
        // Progress never moves backwards within a job.
        state.progress = state.progress.max(progress.min(100));
        state.message = message.to_string();
    }
}

/// Run `work` against `ctx`, recording the outcome in the job state.
pub fn run_job<F>(ctx: &JobContext, work: F) -> FitoverlayResult<PathBuf>
where
    F: FnOnce(&JobContext, &CancelToken) -> FitoverlayResult<PathBuf>,
{
    ctx.start();
    let cancel = ctx.cancel_token();
    match work(ctx, &cancel) {
        Ok(output) => {
            ctx.complete(output.clone());
            Ok(output)
        }
        Err(err) => {
            tracing::error!(stage = err.stage(), frame = ?err.frame_index(), error = %err, "Job failed");
            ctx.fail(&err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_job() {
        let ctx = JobContext::new();
        assert_eq!(ctx.snapshot().status, JobStatus::Queued);

        let out = run_job(&ctx, |reporter, _| {
            reporter.report(40, "halfway");
            reporter.report(30, "late update");
            assert_eq!(reporter.snapshot().progress, 40);
            Ok(PathBuf::from("/tmp/out_with_data.mp4"))
        })
        .unwrap();

        let state = ctx.snapshot();
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.progress, 100);
        assert_eq!(state.output_path, Some(out));
    }

    #[test]
    fn test_failed_job_records_stage_and_frame() {
        let ctx = JobContext::new();
        let err = run_job(&ctx, |_, _| Err(FitoverlayError::render(42, "boom"))).unwrap_err();
        assert_eq!(err.frame_index(), Some(42));

        let state = ctx.snapshot();
        assert_eq!(state.status, JobStatus::Error);
        assert_eq!(state.error_stage.as_deref(), Some("render"));
        assert_eq!(state.error_frame, Some(42));
        assert!(state.message.contains("frame 42"));
        assert!(state.output_path.is_none());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let ctx = JobContext::new();
        let token = ctx.cancel_token();
        assert!(ctx.cancel_token().check().is_ok());
        token.cancel();
        assert!(matches!(ctx.cancel_token().check(), Err(FitoverlayError::Cancelled)));
    }
}
