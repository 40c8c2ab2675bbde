//! Job entry point: sensor track + video in, overlaid video out.

use std::path::{Path, PathBuf};

use image::RgbImage;

use fitoverlay_common::clock::JobClock;
use fitoverlay_common::config::OverlayOptions;
use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};
use fitoverlay_overlay::{FontSet, OverlayRenderer};
use fitoverlay_track::{parse_fit_file, validate_coverage, ParseOptions, TimeAligner, Track};

use crate::compositor::{CompositeStats, CompositorConfig, FrameCompositor, FrameProcessor};
use crate::encoder::{select_encoder, FfmpegEncoderProbe, FfmpegEncoderSink, FrameSink, SinkConfig};
use crate::job::CancelToken;
use crate::progress::{checkpoint, ProgressReporter};
use crate::source::{probe_video, FfmpegFrameSource, FrameSource};

/// Suffix appended to the source file stem for the output file.
pub const OUTPUT_SUFFIX: &str = "_with_data";

/// One processing request.
#[derive(Debug, Clone)]
pub struct JobInputs {
    pub video_path: PathBuf,
    pub track_path: PathBuf,
    /// Track time, in seconds, at video time zero.
    pub offset_secs: f64,
    pub output_dir: PathBuf,
    pub options: OverlayOptions,
    pub parse: ParseOptions,
}

impl JobInputs {
    pub fn new(
        video_path: impl Into<PathBuf>,
        track_path: impl Into<PathBuf>,
        offset_secs: f64,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            track_path: track_path.into(),
            offset_secs,
            output_dir: output_dir.into(),
            options: OverlayOptions::default(),
            parse: ParseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OverlayOptions) -> Self {
        self.options = options;
        self
    }

    /// `<output_dir>/<video stem>_with_data.mp4`.
    pub fn output_path(&self) -> PathBuf {
        output_path_for(&self.video_path, &self.output_dir)
    }
}

/// `<output_dir>/<video stem>_with_data.mp4`.
pub fn output_path_for(video: &Path, output_dir: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    output_dir.join(format!("{stem}{OUTPUT_SUFFIX}.mp4"))
}

/// Renders and blends the overlay for each frame.
pub struct OverlayProcessor<'a> {
    renderer: &'a OverlayRenderer<'a>,
    aligner: TimeAligner<'a>,
}

impl<'a> OverlayProcessor<'a> {
    pub fn new(renderer: &'a OverlayRenderer<'a>, aligner: TimeAligner<'a>) -> Self {
        Self { renderer, aligner }
    }
}

impl FrameProcessor for OverlayProcessor<'_> {
    fn process(&self, index: u64, video_secs: f64, frame: &mut RgbImage) -> FitoverlayResult<()> {
        self.renderer.composite_frame(&self.aligner, index, video_secs, frame)
    }
}

/// Start `sink`, composite every frame of `source` into it and finalize.
///
/// On any failure or cancellation the sink is aborted, which discards its
/// partial output, and the first error is returned.
pub fn run_pipeline(
    compositor: &FrameCompositor,
    source: &mut dyn FrameSource,
    processor: &dyn FrameProcessor,
    sink: &mut dyn FrameSink,
    sink_config: &SinkConfig,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> FitoverlayResult<CompositeStats> {
    sink.begin(sink_config)?;

    let stats = match compositor.run(source, processor, sink, reporter, cancel) {
        Ok(stats) => stats,
        Err(err) => {
            tracing::warn!(stage = err.stage(), "Aborting encoder after pipeline failure");
            sink.abort();
            return Err(err);
        }
    };

    if let Err(err) = cancel.check() {
        sink.abort();
        return Err(err);
    }

    reporter.report(checkpoint::FINALIZE, "Finalizing video");
    if let Err(err) = sink.finish() {
        sink.abort();
        return Err(err);
    }
    Ok(stats)
}

fn ensure_input(path: &Path) -> FitoverlayResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(FitoverlayError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

fn ensure_output_dir(dir: &Path) -> FitoverlayResult<()> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::error!(dir = %dir.display(), error = %e, "Cannot create output directory");
        return Err(e.into());
    }
    let meta = std::fs::metadata(dir)?;
    if meta.permissions().readonly() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("output directory '{}' is not writable", dir.display()),
        )
        .into());
    }
    Ok(())
}

/// Run one job to completion.
pub fn process(inputs: &JobInputs, reporter: &dyn ProgressReporter) -> FitoverlayResult<PathBuf> {
    process_with_cancel(inputs, reporter, &CancelToken::new())
}

/// [`process`] with an external cancellation token.
pub fn process_with_cancel(
    inputs: &JobInputs,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> FitoverlayResult<PathBuf> {
    let clock = JobClock::start();
    let output_path = inputs.output_path();
    tracing::info!(
        video = %inputs.video_path.display(),
        track = %inputs.track_path.display(),
        offset_secs = inputs.offset_secs,
        output = %output_path.display(),
        started = clock.epoch_wall(),
        "Starting job"
    );

    ensure_input(&inputs.video_path)?;
    ensure_input(&inputs.track_path)?;
    ensure_output_dir(&inputs.output_dir)?;

    reporter.report(checkpoint::PARSE, "Parsing track");
    let track = parse_fit_file(&inputs.track_path, &inputs.parse)?;
    cancel.check()?;

    reporter.report(checkpoint::PROBE, "Probing video and encoders");
    let info = probe_video(&inputs.video_path)?;
    let duration = if info.duration_secs > 0.0 {
        info.duration_secs
    } else {
        info.fps.frame_time(info.frame_count)
    };
    validate_coverage(&track, inputs.offset_secs, duration)?;

    let probe = FfmpegEncoderProbe::detect()?.with_trial_encode(true);
    let vendor = select_encoder(&inputs.options.encoder_priority, &probe);
    cancel.check()?;

    let mut source = FfmpegFrameSource::open(&inputs.video_path, info.clone())?;
    let mut sink = FfmpegEncoderSink::new(vendor, &output_path);
    let sink_config = SinkConfig {
        width: info.width,
        height: info.height,
        fps: info.fps,
        audio_source: info.has_audio.then(|| inputs.video_path.clone()),
    };

    let stats = render_track(
        &track,
        inputs,
        &mut source,
        &mut sink,
        &sink_config,
        reporter,
        cancel,
    )?;

    reporter.report(checkpoint::COMPLETE, "Complete");
    tracing::info!(
        output = %output_path.display(),
        encoder = %vendor,
        frames = stats.frames,
        elapsed_secs = clock.elapsed_secs(),
        "Job finished"
    );
    Ok(output_path)
}

/// Overlay `track` onto every frame of `source` and encode into `sink`.
pub fn render_track(
    track: &Track,
    inputs: &JobInputs,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    sink_config: &SinkConfig,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> FitoverlayResult<CompositeStats> {
    let info = source.info().clone();
    let fonts = FontSet::load_or_bundled(&inputs.options.fonts);
    let renderer = OverlayRenderer::new(track, info.width, info.height)
        .with_fonts(fonts)
        .with_orientation(inputs.options.minimap_orientation);
    let aligner = TimeAligner::new(track, inputs.offset_secs);
    let processor = OverlayProcessor::new(&renderer, aligner);

    let compositor = FrameCompositor::new(CompositorConfig::new(
        inputs.options.workers(),
        inputs.options.reorder_capacity(),
    ));
    run_pipeline(&compositor, source, &processor, sink, sink_config, reporter, cancel)
}
