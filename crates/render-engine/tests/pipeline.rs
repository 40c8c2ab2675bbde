use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{Rgb, RgbImage};
use proptest::prelude::*;

use fitoverlay_common::config::EncoderVendor;
use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};
use fitoverlay_render_engine::encoder::partial_path_for;
use fitoverlay_render_engine::{
    render_track, run_job, run_pipeline, select_encoder, CancelToken, CompositorConfig,
    EncoderSpec, FrameCompositor, FrameRate, FrameSink, JobContext, JobInputs, JobStatus,
    MemoryFrameSource, NoProgress, RecordingSink, SinkConfig, VideoInfo,
};
use fitoverlay_track::synthetic::steady_run;
use fitoverlay_track::Track;

fn indexed_source(count: u64) -> MemoryFrameSource {
    let info = VideoInfo {
        width: 4,
        height: 4,
        fps: FrameRate::new(30, 1),
        frame_count: count,
        duration_secs: count as f64 / 30.0,
        has_audio: false,
    };
    let frames = (0..count)
        .map(|i| RgbImage::from_pixel(4, 4, Rgb([(i % 256) as u8, (i / 256) as u8, 0])))
        .collect();
    MemoryFrameSource::new(info, frames)
}

fn sink_config(width: u32, height: u32) -> SinkConfig {
    SinkConfig {
        width,
        height,
        fps: FrameRate::new(30, 1),
        audio_source: None,
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fitoverlay-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

/// Writes raw frames to a hidden partial file and renames it on finish.
struct RawFileSink {
    output: PathBuf,
    partial: PathBuf,
    file: Option<File>,
}

impl RawFileSink {
    fn new(output: PathBuf) -> Self {
        let partial = partial_path_for(&output);
        Self {
            output,
            partial,
            file: None,
        }
    }
}

impl FrameSink for RawFileSink {
    fn begin(&mut self, _config: &SinkConfig) -> FitoverlayResult<()> {
        self.file = Some(File::create(&self.partial)?);
        Ok(())
    }

    fn push_frame(&mut self, _index: u64, frame: &RgbImage) -> FitoverlayResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| FitoverlayError::encoding("sink not started"))?;
        file.write_all(frame.as_raw())?;
        Ok(())
    }

    fn finish(&mut self) -> FitoverlayResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        std::fs::rename(&self.partial, &self.output)?;
        Ok(())
    }

    fn abort(&mut self) {
        self.file = None;
        let _ = std::fs::remove_file(&self.partial);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn frames_reach_sink_in_order_under_random_delays(
        delays in prop::collection::vec(0u64..3, 24..48),
        workers in 1usize..6,
    ) {
        let count = delays.len() as u64;
        let mut source = indexed_source(count);
        let mut sink = RecordingSink::keeping_frames();
        let processor = |index: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> {
            std::thread::sleep(Duration::from_millis(delays[index as usize]));
            Ok(())
        };

        let stats = run_pipeline(
            &FrameCompositor::new(CompositorConfig::new(workers, workers * 2)),
            &mut source,
            &processor,
            &mut sink,
            &sink_config(4, 4),
            &NoProgress,
            &CancelToken::new(),
        )
        .unwrap();

        prop_assert_eq!(stats.frames, count);
        prop_assert_eq!(sink.indices, (0..count).collect::<Vec<_>>());
        for (i, frame) in sink.frames.iter().enumerate() {
            prop_assert_eq!(frame.get_pixel(0, 0)[0], (i % 256) as u8);
        }
        prop_assert!(sink.finished);
    }
}

#[test]
fn unavailable_hardware_falls_back_to_software_and_completes() {
    let vendor = select_encoder(&EncoderVendor::DEFAULT_PRIORITY, &|_: EncoderVendor| false);
    assert_eq!(vendor, EncoderVendor::Software);
    assert_eq!(EncoderSpec::for_vendor(vendor).codec, "libx264");

    let track = Track::from_samples(steady_run(3, 140.0)).unwrap();
    let inputs = JobInputs::new("run.mp4", "run.fit", 0.0, "/tmp");
    let ctx = JobContext::new();
    let mut sink = RecordingSink::new();

    let output = run_job(&ctx, |reporter, cancel| {
        let mut source = MemoryFrameSource::solid(64, 36, FrameRate::new(30, 1), 60, [0, 0, 0]);
        render_track(
            &track,
            &inputs,
            &mut source,
            &mut sink,
            &sink_config(64, 36),
            reporter,
            cancel,
        )?;
        Ok(inputs.output_path())
    })
    .unwrap();

    let state = ctx.snapshot();
    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.progress, 100);
    assert_eq!(state.output_path, Some(output));
    assert_eq!(sink.indices.len(), 60);
}

#[test]
fn render_failure_leaves_no_output_file() {
    let dir = scratch_dir("abort");
    let output = dir.join("clip_with_data.raw");
    let ctx = JobContext::new();

    let err = run_job(&ctx, |reporter, cancel| {
        let mut source = indexed_source(40);
        let mut sink = RawFileSink::new(output.clone());
        let processor = |index: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> {
            if index == 23 {
                return Err(FitoverlayError::render(index, "overlay exploded"));
            }
            Ok(())
        };
        run_pipeline(
            &FrameCompositor::new(CompositorConfig::new(3, 6)),
            &mut source,
            &processor,
            &mut sink,
            &sink_config(4, 4),
            reporter,
            cancel,
        )?;
        Ok(output.clone())
    })
    .unwrap_err();

    assert_eq!(err.frame_index(), Some(23));
    let state = ctx.snapshot();
    assert_eq!(state.status, JobStatus::Error);
    assert_eq!(state.error_stage.as_deref(), Some("render"));
    assert_eq!(state.error_frame, Some(23));
    assert!(state.message.contains("23"));
    assert!(dir_entries(&dir).is_empty(), "partial output left behind");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn successful_file_sink_leaves_only_final_output() {
    let dir = scratch_dir("finish");
    let output = dir.join("clip_with_data.raw");
    let mut source = indexed_source(10);
    let mut sink = RawFileSink::new(output.clone());

    run_pipeline(
        &FrameCompositor::new(CompositorConfig::new(2, 4)),
        &mut source,
        &|_: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> { Ok(()) },
        &mut sink,
        &sink_config(4, 4),
        &NoProgress,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(dir_entries(&dir), vec![output.clone()]);
    assert_eq!(std::fs::metadata(&output).unwrap().len(), 10 * 4 * 4 * 3);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn cancellation_stops_job_and_discards_output() {
    let dir = scratch_dir("cancel");
    let output = dir.join("clip_with_data.raw");
    let ctx = JobContext::new();
    let token = ctx.cancel_token();

    let err = run_job(&ctx, |reporter, cancel| {
        let mut source = indexed_source(200);
        let mut sink = RawFileSink::new(output.clone());
        let processor = |index: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> {
            if index == 10 {
                token.cancel();
            }
            Ok(())
        };
        run_pipeline(
            &FrameCompositor::new(CompositorConfig::new(2, 4)),
            &mut source,
            &processor,
            &mut sink,
            &sink_config(4, 4),
            reporter,
            cancel,
        )?;
        Ok(output.clone())
    })
    .unwrap_err();

    assert!(matches!(err, FitoverlayError::Cancelled));
    assert_eq!(ctx.snapshot().status, JobStatus::Error);
    assert_eq!(ctx.snapshot().error_stage.as_deref(), Some("cancelled"));
    assert!(dir_entries(&dir).is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn progress_reaches_finalize_checkpoint() {
    let ctx = JobContext::new();
    let mut source = indexed_source(50);
    let mut sink = RecordingSink::new();
    run_pipeline(
        &FrameCompositor::new(CompositorConfig::new(2, 4)),
        &mut source,
        &|_: u64, _: f64, _: &mut RgbImage| -> FitoverlayResult<()> { Ok(()) },
        &mut sink,
        &sink_config(4, 4),
        &ctx,
        &CancelToken::new(),
    )
    .unwrap();

    let state = ctx.snapshot();
    assert_eq!(state.progress, 95);
    assert_eq!(state.status, JobStatus::Running);
}
