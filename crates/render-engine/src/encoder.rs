//! Encoder selection and the encoding frame sink.
//!
//! Selection is a pure function over capability probe results, so the
//! hardware fallback chain can be tested without any GPU. The chosen
//! encoder is fixed for the job and driven through the [`FrameSink`]
//! begin / push / finish contract.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;

use image::RgbImage;

use fitoverlay_common::config::EncoderVendor;
use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

use crate::source::FrameRate;

/// ffmpeg codec name and quality parameters for one encoder family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSpec {
    pub vendor: EncoderVendor,
    pub codec: &'static str,
    pub args: &'static [&'static str],
    pub pix_fmt: &'static str,
}

impl EncoderSpec {
    pub fn for_vendor(vendor: EncoderVendor) -> Self {
        match vendor {
            EncoderVendor::Nvidia => Self {
                vendor,
                codec: "h264_nvenc",
                args: &["-preset", "p4", "-cq", "28"],
                pix_fmt: "yuv420p",
            },
            EncoderVendor::Intel => Self {
                vendor,
                codec: "h264_qsv",
                args: &["-preset", "medium", "-global_quality", "28"],
                pix_fmt: "nv12",
            },
            EncoderVendor::Amd => Self {
                vendor,
                codec: "h264_amf",
                args: &["-quality", "balanced", "-qp_i", "28"],
                pix_fmt: "yuv420p",
            },
            EncoderVendor::Software => Self {
                vendor,
                codec: "libx264",
                args: &["-preset", "medium", "-crf", "28"],
                pix_fmt: "yuv420p",
            },
        }
    }
}

/// Capability query for an encoder family.
pub trait EncoderProbe {
    fn is_available(&self, vendor: EncoderVendor) -> bool;
}

impl<F> EncoderProbe for F
where
    F: Fn(EncoderVendor) -> bool,
{
    fn is_available(&self, vendor: EncoderVendor) -> bool {
        self(vendor)
    }
}

/// Pick the first available encoder in `priority` order.
///
/// The software encoder ends the chain: it is returned when reached in the
/// list, and whenever no hardware encoder is available.
pub fn select_encoder(priority: &[EncoderVendor], probe: &dyn EncoderProbe) -> EncoderVendor {
    for &vendor in priority {
        if vendor == EncoderVendor::Software {
            break;
        }
        if probe.is_available(vendor) {
            tracing::info!(encoder = %vendor, "Hardware encoder available");
            return vendor;
        }
        tracing::debug!(encoder = %vendor, "Encoder unavailable");
    }
    tracing::info!(encoder = %EncoderVendor::Software, "Using software encoder");
    EncoderVendor::Software
}

/// Probes encoders through the `ffmpeg` binary.
///
/// `ffmpeg -encoders` is listed once at construction. Hardware encoders that
/// appear in the listing are additionally checked with a one-frame trial
/// encode to the null muxer, since builds list them whether or not the
/// device is present. Results are cached per vendor.
#[derive(Debug)]
pub struct FfmpegEncoderProbe {
    listing: String,
    trial_encode: bool,
    cache: Mutex<HashMap<EncoderVendor, bool>>,
}

impl FfmpegEncoderProbe {
    pub fn detect() -> FitoverlayResult<Self> {
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| FitoverlayError::encoding(format!("Failed to run ffmpeg -encoders: {e}")))?;
        if !output.status.success() {
            return Err(FitoverlayError::encoding(format!(
                "ffmpeg -encoders failed (status {})",
                output.status
            )));
        }
        Ok(Self::from_listing(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    /// Probe from a captured `-encoders` listing without trial encodes.
    pub fn from_listing(listing: String) -> Self {
        Self {
            listing,
            trial_encode: false,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Enable the one-frame trial encode for listed hardware encoders.
    pub fn with_trial_encode(mut self, enabled: bool) -> Self {
        self.trial_encode = enabled;
        self
    }

    /// Whether `codec` appears as an encoder name in the listing.
    pub fn lists(&self, codec: &str) -> bool {
        self.listing
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|name| name == codec)
    }

    fn trial(codec: &str) -> bool {
        Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-nostdin",
                "-f",
                "lavfi",
                "-i",
                "color=c=black:s=256x256:d=0.1",
                "-frames:v",
                "1",
                "-c:v",
                codec,
                "-f",
                "null",
                "-",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl EncoderProbe for FfmpegEncoderProbe {
    fn is_available(&self, vendor: EncoderVendor) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache.entry(vendor).or_insert_with(|| {
            let codec = EncoderSpec::for_vendor(vendor).codec;
            let listed = self.lists(codec);
            let usable = listed && (!self.trial_encode || vendor == EncoderVendor::Software || Self::trial(codec));
            tracing::debug!(encoder = %vendor, codec, listed, usable, "Probed encoder");
            usable
        })
    }
}

/// Stream parameters handed to a sink before the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
    /// File whose audio stream is copied into the output, if any.
    pub audio_source: Option<PathBuf>,
}

/// Consumer of composited frames.
///
/// `push_frame` is called with strictly increasing indices. Exactly one of
/// `finish` or `abort` ends the stream.
pub trait FrameSink: Send {
    fn begin(&mut self, config: &SinkConfig) -> FitoverlayResult<()>;

    fn push_frame(&mut self, index: u64, frame: &RgbImage) -> FitoverlayResult<()>;

    /// Flush and finalize the output.
    fn finish(&mut self) -> FitoverlayResult<()>;

    /// Tear down and discard any partial output.
    fn abort(&mut self);
}

/// Encodes frames with an `ffmpeg` child process reading `rgb24` on stdin.
///
/// Output goes to a hidden partial file next to the destination and is
/// renamed into place only after the encoder exits cleanly.
pub struct FfmpegEncoderSink {
    spec: EncoderSpec,
    output_path: PathBuf,
    partial_path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<String>>,
    config: Option<SinkConfig>,
    last_index: Option<u64>,
}

impl FfmpegEncoderSink {
    pub fn new(vendor: EncoderVendor, output_path: impl Into<PathBuf>) -> Self {
        let output_path = output_path.into();
        let partial_path = partial_path_for(&output_path);
        Self {
            spec: EncoderSpec::for_vendor(vendor),
            output_path,
            partial_path,
            child: None,
            stdin: None,
            stderr_drain: None,
            config: None,
            last_index: None,
        }
    }

    pub fn spec(&self) -> &EncoderSpec {
        &self.spec
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    fn build_command(&self, config: &SinkConfig) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-hide_banner", "-loglevel", "error", "-nostats"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", config.width, config.height))
            .arg("-r")
            .arg(config.fps.to_string())
            .args(["-i", "pipe:0"]);

        match &config.audio_source {
            Some(source) => {
                cmd.arg("-i")
                    .arg(source)
                    .args(["-map", "0:v:0", "-map", "1:a?", "-c:a", "copy"]);
            }
            None => {
                cmd.arg("-an");
            }
        }

        cmd.args(["-c:v", self.spec.codec])
            .args(self.spec.args)
            .args(["-pix_fmt", self.spec.pix_fmt])
            .args(["-movflags", "+faststart", "-f", "mp4"])
            .arg(&self.partial_path);
        cmd
    }

    fn join_stderr(&mut self) -> String {
        self.stderr_drain
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }

    fn remove_partial(&self) {
        if self.partial_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.partial_path) {
                tracing::warn!(path = %self.partial_path.display(), error = %err, "Failed to remove partial output");
            }
        }
    }
}

impl FrameSink for FfmpegEncoderSink {
    fn begin(&mut self, config: &SinkConfig) -> FitoverlayResult<()> {
        if config.width == 0 || config.height == 0 {
            return Err(FitoverlayError::encoding("Output width/height must be non-zero"));
        }
        if config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(FitoverlayError::encoding(format!(
                "Output size {}x{} must be even for yuv420p H.264",
                config.width, config.height
            )));
        }

        let mut cmd = self.build_command(config);
        tracing::debug!(command = ?cmd, "Starting encoder");
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FitoverlayError::encoding(format!("Failed to start ffmpeg encoder: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FitoverlayError::encoding("Failed to open ffmpeg encoder stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FitoverlayError::encoding("Failed to capture ffmpeg encoder stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut output = String::new();
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(
            pid = child.id(),
            encoder = self.spec.codec,
            width = config.width,
            height = config.height,
            fps = %config.fps,
            audio = config.audio_source.is_some(),
            "Encoder started"
        );

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.config = Some(config.clone());
        self.last_index = None;
        Ok(())
    }

    fn push_frame(&mut self, index: u64, frame: &RgbImage) -> FitoverlayResult<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| FitoverlayError::encoding("Encoder not started"))?;
        if self.last_index.is_some_and(|last| index <= last) {
            return Err(FitoverlayError::encoding(format!(
                "Encoder received frame {index} out of order"
            )));
        }
        if frame.dimensions() != (config.width, config.height) {
            return Err(FitoverlayError::encoding(format!(
                "Frame {index} is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                config.width,
                config.height
            )));
        }
        self.last_index = Some(index);

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| FitoverlayError::encoding("Encoder already finalized"))?;
        if let Err(err) = stdin.write_all(frame.as_raw()) {
            self.stdin = None;
            let status = self.child.as_mut().and_then(|c| c.wait().ok());
            let stderr = self.join_stderr();
            return Err(FitoverlayError::encoding(format!(
                "Encoder failed at frame {index} ({err}, status {}): {}",
                status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into()),
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn finish(&mut self) -> FitoverlayResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| FitoverlayError::encoding("Encoder not started"))?;
        let status = child
            .wait()
            .map_err(|e| FitoverlayError::encoding(format!("Failed to wait on ffmpeg encoder: {e}")))?;
        let stderr = self.join_stderr();
        self.config = None;

        if !status.success() {
            self.remove_partial();
            return Err(FitoverlayError::encoding(format!(
                "ffmpeg encoder failed (status {status}): {}",
                stderr.trim()
            )));
        }

        if let Err(err) = std::fs::rename(&self.partial_path, &self.output_path) {
            self.remove_partial();
            return Err(err.into());
        }
        tracing::info!(output = %self.output_path.display(), frames = self.last_index.map_or(0, |i| i + 1), "Encoder finalized");
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let _ = self.join_stderr();
        self.config = None;
        self.remove_partial();
    }
}

impl Drop for FfmpegEncoderSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

/// Hidden in-progress file for `output`: `<dir>/.<name>.partial`.
pub fn partial_path_for(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mp4".to_string());
    output.with_file_name(format!(".{name}.partial"))
}

/// Sink that keeps frame indices (and optionally frames) in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub config: Option<SinkConfig>,
    pub indices: Vec<u64>,
    pub frames: Vec<RgbImage>,
    pub keep_frames: bool,
    pub finished: bool,
    pub aborted: bool,
    /// Fail `push_frame` at this index.
    pub fail_at: Option<u64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keeping_frames() -> Self {
        Self {
            keep_frames: true,
            ..Self::default()
        }
    }
}

impl FrameSink for RecordingSink {
    fn begin(&mut self, config: &SinkConfig) -> FitoverlayResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn push_frame(&mut self, index: u64, frame: &RgbImage) -> FitoverlayResult<()> {
        if self.fail_at == Some(index) {
            return Err(FitoverlayError::encoding(format!("injected failure at frame {index}")));
        }
        self.indices.push(index);
        if self.keep_frames {
            self.frames.push(frame.clone());
        }
        Ok(())
    }

    fn finish(&mut self) -> FitoverlayResult<()> {
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
