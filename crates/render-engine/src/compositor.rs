//! Frame compositor: parallel per-frame rendering with in-order delivery.
//!
//! ```text
//!                 ┌─ worker 0 ─┐
//! source ─ dispatch ─ worker 1 ─┼─ OrderingBarrier ─ sink (single consumer)
//!   (reserve)     └─ worker N ─┘
//! ```
//!
//! The dispatcher reserves a barrier slot before decoding each frame, so
//! decoded, in-flight and buffered frames never exceed the barrier capacity.
//! The first failure anywhere aborts the barrier, which unblocks every
//! thread; the job then returns that first error.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use crossbeam_channel::bounded;
use image::RgbImage;

use fitoverlay_common::clock::{JobClock, ProgressThrottle};
use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

use crate::barrier::OrderingBarrier;
use crate::encoder::FrameSink;
use crate::job::CancelToken;
use crate::progress::{checkpoint, ProgressReporter};
use crate::source::FrameSource;

/// Per-frame work: render the overlay for `video_secs` and blend it onto
/// `frame` in place.
pub trait FrameProcessor: Sync {
    fn process(&self, index: u64, video_secs: f64, frame: &mut RgbImage) -> FitoverlayResult<()>;
}

impl<F> FrameProcessor for F
where
    F: Fn(u64, f64, &mut RgbImage) -> FitoverlayResult<()> + Sync,
{
    fn process(&self, index: u64, video_secs: f64, frame: &mut RgbImage) -> FitoverlayResult<()> {
        self(index, video_secs, frame)
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositorConfig {
    pub workers: usize,
    /// Barrier capacity: frames decoded but not yet handed to the sink.
    pub reorder_capacity: usize,
}

impl CompositorConfig {
    pub fn new(workers: usize, reorder_capacity: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            reorder_capacity: reorder_capacity.max(workers),
        }
    }
}

/// Outcome of a successful compositing run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeStats {
    pub frames: u64,
    pub elapsed_secs: f64,
}

/// First error wins; later ones are logged and dropped.
#[derive(Debug, Default)]
struct FirstError(Mutex<Option<FitoverlayError>>);

impl FirstError {
    fn record(&self, err: FitoverlayError) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        } else {
            tracing::debug!(error = %err, "Suppressed follow-up pipeline error");
        }
    }

    fn take(self) -> Option<FitoverlayError> {
        self.0.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drives a [`FrameSource`] through a worker pool into a [`FrameSink`].
#[derive(Debug, Clone, Copy)]
pub struct FrameCompositor {
    config: CompositorConfig,
}

impl FrameCompositor {
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> CompositorConfig {
        self.config
    }

    /// Process every frame of `source` and push the results to `sink` in
    /// index order.
    ///
    /// The sink must already be started; finishing or aborting it is left
    /// to the caller. Progress is reported across the render band.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        processor: &dyn FrameProcessor,
        sink: &mut dyn FrameSink,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> FitoverlayResult<CompositeStats> {
        let info = source.info().clone();
        let workers = self.config.workers;
        let barrier = OrderingBarrier::<RgbImage>::new(self.config.reorder_capacity);
        let errors = FirstError::default();
        let clock = JobClock::start();

        tracing::info!(
            workers,
            reorder_capacity = barrier.capacity(),
            frames = info.frame_count,
            "Compositing started"
        );

        let delivered = std::thread::scope(|scope| {
            let (tx, rx) = bounded::<(u64, RgbImage)>(workers);

            for worker in 0..workers {
                let rx = rx.clone();
                let barrier = &barrier;
                let errors = &errors;
                let info = &info;
                scope.spawn(move || {
                    for (index, mut frame) in rx.iter() {
                        if barrier.is_aborted() {
                            continue;
                        }
                        let video_secs = info.frame_time(index);
                        let result = catch_unwind(AssertUnwindSafe(|| {
                            processor.process(index, video_secs, &mut frame)
                        }))
                        .unwrap_or_else(|_| Err(FitoverlayError::render(index, "frame rendering panicked")));

                        match result {
                            Ok(()) => barrier.complete(index, frame),
                            Err(err) => {
                                let err = match err.frame_index() {
                                    Some(_) => err,
                                    None => FitoverlayError::render(index, err.to_string()),
                                };
                                tracing::error!(worker, frame = index, error = %err, "Frame failed");
                                errors.record(err);
                                barrier.abort();
                            }
                        }
                    }
                });
            }
            drop(rx);

            let dispatcher = {
                let barrier = &barrier;
                let errors = &errors;
                scope.spawn(move || {
                    let mut index = 0u64;
                    loop {
                        if cancel.is_cancelled() {
                            errors.record(FitoverlayError::Cancelled);
                            barrier.abort();
                            break;
                        }
                        if !barrier.reserve(index) {
                            break;
                        }
                        let next = catch_unwind(AssertUnwindSafe(|| source.next_frame()))
                            .unwrap_or_else(|_| Err(FitoverlayError::encoding("frame decoder panicked")));
                        match next {
                            Ok(Some(frame)) => {
                                if tx.send((index, frame)).is_err() {
                                    break;
                                }
                                index += 1;
                            }
                            Ok(None) => {
                                barrier.close(index);
                                break;
                            }
                            Err(err) => {
                                errors.record(err);
                                barrier.abort();
                                break;
                            }
                        }
                    }
                    tracing::debug!(dispatched = index, "Dispatcher finished");
                })
            };

            let mut throttle = ProgressThrottle::new(checkpoint::RENDER_START, checkpoint::FINALIZE);
            let mut delivered = 0u64;
            'drain: while let Some(run) = barrier.next_run() {
                for (index, frame) in run {
                    if let Err(err) = sink.push_frame(index, &frame) {
                        errors.record(err);
                        barrier.abort();
                        break 'drain;
                    }
                    delivered += 1;

                    let total = info.frame_count.max(delivered);
                    if let Some(pct) = throttle.advance(delivered, total) {
                        let eta = clock.eta_secs(delivered, total);
                        reporter.report(
                            pct,
                            &format!(
                                "Rendering frame {delivered}/{total} with {workers} workers, ETA {eta:.0}s"
                            ),
                        );
                    }
                }
                if cancel.is_cancelled() {
                    errors.record(FitoverlayError::Cancelled);
                    barrier.abort();
                    break;
                }
            }

            if dispatcher.join().is_err() {
                errors.record(FitoverlayError::encoding("frame decoder thread panicked"));
            }
            delivered
        });

        if let Some(err) = errors.take() {
            return Err(err);
        }

        let stats = CompositeStats {
            frames: delivered,
            elapsed_secs: clock.elapsed_secs(),
        };
        tracing::info!(
            frames = stats.frames,
            elapsed_secs = stats.elapsed_secs,
            fps = stats.frames as f64 / stats.elapsed_secs.max(1e-9),
            "Compositing finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::RecordingSink;
    use crate::progress::NoProgress;
    use crate::source::{FrameRate, MemoryFrameSource};

    fn source(count: u64) -> MemoryFrameSource {
        MemoryFrameSource::solid(8, 8, FrameRate::new(10, 1), count, [0, 0, 0])
    }

    #[test]
    fn test_frames_arrive_in_order_and_processed() {
        let mut src = source(50);
        let mut sink = RecordingSink::keeping_frames();
        let stamp = |index: u64, _t: f64, frame: &mut RgbImage| -> FitoverlayResult<()> {
            frame.put_pixel(0, 0, image::Rgb([index as u8, 0, 0]));
            Ok(())
        };

        let stats = FrameCompositor::new(CompositorConfig::new(4, 8))
            .run(&mut src, &stamp, &mut sink, &NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(stats.frames, 50);
        assert_eq!(sink.indices, (0..50).collect::<Vec<_>>());
        for (i, frame) in sink.frames.iter().enumerate() {
            assert_eq!(frame.get_pixel(0, 0)[0], i as u8);
        }
    }

    #[test]
    fn test_video_time_follows_frame_rate() {
        let mut src = source(5);
        let mut sink = RecordingSink::new();
        let times = Mutex::new(Vec::new());
        let record = |index: u64, t: f64, _: &mut RgbImage| -> FitoverlayResult<()> {
            times.lock().unwrap().push((index, t));
            Ok(())
        };
        FrameCompositor::new(CompositorConfig::new(2, 2))
            .run(&mut src, &record, &mut sink, &NoProgress, &CancelToken::new())
            .unwrap();

        let mut times = times.into_inner().unwrap();
        times.sort_by_key(|(i, _)| *i);
        assert_eq!(times[3], (3, 0.3));
    }

    #[test]
    fn test_processor_error_aborts_with_frame_index() {
        let mut src = source(40);
        let mut sink = RecordingSink::new();
        let fail = |index: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> {
            if index == 17 {
                Err(FitoverlayError::config("bad frame"))
            } else {
                Ok(())
            }
        };
        let err = FrameCompositor::new(CompositorConfig::new(3, 6))
            .run(&mut src, &fail, &mut sink, &NoProgress, &CancelToken::new())
            .unwrap_err();

        assert_eq!(err.stage(), "render");
        assert_eq!(err.frame_index(), Some(17));
        assert!(sink.indices.iter().all(|i| *i < 17));
    }

    #[test]
    fn test_panicking_processor_is_reported_as_render_error() {
        let mut src = source(10);
        let mut sink = RecordingSink::new();
        let boom = |index: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> {
            if index == 4 {
                panic!("kaboom");
            }
            Ok(())
        };
        let err = FrameCompositor::new(CompositorConfig::new(2, 4))
            .run(&mut src, &boom, &mut sink, &NoProgress, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.frame_index(), Some(4));
    }

    struct PanicsAt {
        inner: MemoryFrameSource,
        at: u64,
        served: u64,
    }

    impl FrameSource for PanicsAt {
        fn info(&self) -> &crate::source::VideoInfo {
            self.inner.info()
        }

        fn next_frame(&mut self) -> FitoverlayResult<Option<RgbImage>> {
            if self.served == self.at {
                panic!("decoder blew up");
            }
            self.served += 1;
            self.inner.next_frame()
        }
    }

    #[test]
    fn test_panicking_decoder_fails_instead_of_hanging() {
        let mut src = PanicsAt {
            inner: source(20),
            at: 6,
            served: 0,
        };
        let mut sink = RecordingSink::new();
        let ok = |_: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> { Ok(()) };
        let err = FrameCompositor::new(CompositorConfig::new(2, 4))
            .run(&mut src, &ok, &mut sink, &NoProgress, &CancelToken::new())
            .unwrap_err();

        assert_eq!(err.stage(), "encode");
        assert!(sink.indices.iter().all(|i| *i < 6));
    }

    #[test]
    fn test_sink_error_stops_pipeline() {
        let mut src = source(30);
        let mut sink = RecordingSink {
            fail_at: Some(9),
            ..RecordingSink::new()
        };
        let ok = |_: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> { Ok(()) };
        let err = FrameCompositor::new(CompositorConfig::new(2, 4))
            .run(&mut src, &ok, &mut sink, &NoProgress, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.stage(), "encode");
        assert_eq!(sink.indices, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_before_start() {
        let mut src = source(10);
        let mut sink = RecordingSink::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ok = |_: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> { Ok(()) };
        let err = FrameCompositor::new(CompositorConfig::new(2, 4))
            .run(&mut src, &ok, &mut sink, &NoProgress, &cancel)
            .unwrap_err();
        assert!(matches!(err, FitoverlayError::Cancelled));
        assert!(sink.indices.is_empty());
    }

    #[test]
    fn test_progress_stays_in_render_band() {
        let mut src = source(100);
        let mut sink = RecordingSink::new();
        let seen = Mutex::new(Vec::new());
        let reporter = |p: u8, _: &str| seen.lock().unwrap().push(p);
        let ok = |_: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> { Ok(()) };
        FrameCompositor::new(CompositorConfig::new(4, 16))
            .run(&mut src, &ok, &mut sink, &reporter, &CancelToken::new())
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|p| (10..=95).contains(p)));
        assert_eq!(*seen.last().unwrap(), 95);
    }
}
