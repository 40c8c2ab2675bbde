//! fitoverlay Render Engine
//!
//! Turns a source video plus an aligned sensor track into a new video with
//! the overlay burned in.
//!
//! # Pipeline Architecture
//!
//! ```text
//! video.mp4 ── ffmpeg decode ── FrameSource ──┐
//!                                             │  (dispatcher, bounded)
//!                                             ▼
//!                              worker 1..N: render overlay + blend
//!                                             │
//!                                             ▼
//!                              OrderingBarrier (reorder window)
//!                                             │  strictly increasing index
//!                                             ▼
//!                       FrameSink ── ffmpeg encode (nvenc|qsv|amf|x264)
//!                                             │
//!                                             ▼
//!                               <stem>_with_data.mp4 (audio copied)
//! ```
//!
//! [`process`] is the single blocking entry point; progress flows through a
//! [`ProgressReporter`] and cancellation through a [`CancelToken`].

pub mod barrier;
pub mod compositor;
pub mod encoder;
pub mod export;
pub mod job;
pub mod preview;
pub mod progress;
pub mod source;

pub use barrier::OrderingBarrier;
pub use compositor::{CompositeStats, CompositorConfig, FrameCompositor, FrameProcessor};
pub use encoder::{
    select_encoder, EncoderProbe, EncoderSpec, FfmpegEncoderProbe, FfmpegEncoderSink, FrameSink,
    RecordingSink, SinkConfig,
};
pub use export::{
    output_path_for, process, process_with_cancel, render_track, run_pipeline, JobInputs,
    OverlayProcessor,
};
pub use job::{run_job, CancelToken, JobContext, JobState, JobStatus};
pub use preview::render_preview;
pub use progress::{LogProgress, NoProgress, ProgressReporter};
pub use source::{probe_video, FfmpegFrameSource, FrameRate, FrameSource, MemoryFrameSource, VideoInfo};
