//! Video probing and frame decoding.
//!
//! Decoding is delegated to the `ffmpeg` binary, which streams raw `rgb24`
//! frames on stdout in presentation order; `ffprobe` supplies the stream
//! metadata up front.

use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use image::{Rgb, RgbImage};
use serde::Deserialize;

use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

/// Rational frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Presentation time of frame `index`, in seconds.
    pub fn frame_time(&self, index: u64) -> f64 {
        if self.num == 0 {
            return 0.0;
        }
        index as f64 * self.den as f64 / self.num as f64
    }

    /// Parse ffprobe's `num/den` notation.
    pub fn parse(s: &str) -> Option<Self> {
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
            None => (s.trim().parse().ok()?, 1),
        };
        (num > 0 && den > 0).then_some(Self { num, den })
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Stream metadata of the source video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
    /// Frame count; estimated from duration when the container omits it.
    pub frame_count: u64,
    pub duration_secs: f64,
    pub has_audio: bool,
}

impl VideoInfo {
    pub fn frame_time(&self, index: u64) -> f64 {
        self.fps.frame_time(index)
    }
}

/// Ordered source of decoded frames.
pub trait FrameSource: Send {
    fn info(&self) -> &VideoInfo;

    /// Next frame in presentation order, `None` at end of stream.
    fn next_frame(&mut self) -> FitoverlayResult<Option<RgbImage>>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    tags: Option<ProbeTags>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    /// Display rotation in degrees, normalised to `0..360`.
    ///
    /// Newer ffprobe reports it in the display matrix side data, older
    /// builds in the `rotate` tag.
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe `path` with `ffprobe`.
pub fn probe_video(path: &Path) -> FitoverlayResult<VideoInfo> {
    if !path.exists() {
        return Err(FitoverlayError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| FitoverlayError::encoding(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(FitoverlayError::encoding(format!(
            "ffprobe failed on {} (status {}): {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let info = parse_probe_json(&String::from_utf8_lossy(&output.stdout))?;
    tracing::info!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = %info.fps,
        frames = info.frame_count,
        audio = info.has_audio,
        "Probed source video"
    );
    Ok(info)
}

/// Extract [`VideoInfo`] from `ffprobe -print_format json` output.
pub fn parse_probe_json(json: &str) -> FitoverlayResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FitoverlayError::encoding("Source has no video stream"))?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let (coded_width, coded_height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(FitoverlayError::encoding("Video stream has no dimensions")),
    };
    // The decoder applies the display rotation, so quarter turns swap the
    // frame dimensions it emits.
    let rotation = video.rotation();
    let (width, height) = match rotation {
        90 | 270 => (coded_height, coded_width),
        _ => (coded_width, coded_height),
    };
    if rotation != 0 {
        tracing::debug!(rotation, width, height, "Source has display rotation");
    }

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(FrameRate::parse)
        .or_else(|| video.avg_frame_rate.as_deref().and_then(FrameRate::parse))
        .ok_or_else(|| FitoverlayError::encoding("Video stream has no frame rate"))?;

    let duration_secs = video
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration_secs * fps.as_f64()).round() as u64);

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
        duration_secs,
        has_audio,
    })
}

/// Decodes frames by reading `ffmpeg`'s raw `rgb24` output.
///
/// ffmpeg applies display rotation, so `info` must carry the upright
/// dimensions reported by [`probe_video`].
pub struct FfmpegFrameSource {
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_drain: Option<std::thread::JoinHandle<String>>,
    frame_bytes: usize,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path, info: VideoInfo) -> FitoverlayResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FitoverlayError::encoding(format!("Failed to start ffmpeg decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FitoverlayError::encoding("Failed to capture ffmpeg decoder stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FitoverlayError::encoding("Failed to capture ffmpeg decoder stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut output = String::new();
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::debug!(pid = child.id(), path = %path.display(), "ffmpeg decoder started");
        Ok(Self {
            frame_bytes: info.width as usize * info.height as usize * 3,
            info,
            child: Some(child),
            stdout: Some(BufReader::new(stdout)),
            stderr_drain: Some(stderr_drain),
        })
    }

    fn finish(&mut self) -> FitoverlayResult<()> {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| FitoverlayError::encoding(format!("Failed to wait on ffmpeg decoder: {e}")))?;
        let stderr = self
            .stderr_drain
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(FitoverlayError::encoding(format!(
                "ffmpeg decoder failed (status {status}): {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> FitoverlayResult<Option<RgbImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            let n = stdout.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < buf.len() {
            self.finish()?;
            return Err(FitoverlayError::encoding(format!(
                "Truncated frame from decoder: {filled} of {} bytes",
                buf.len()
            )));
        }

        RgbImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| FitoverlayError::encoding("Decoded frame has the wrong size"))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Frames held in memory, for tests and generated content.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    info: VideoInfo,
    frames: VecDeque<RgbImage>,
}

impl MemoryFrameSource {
    pub fn new(info: VideoInfo, frames: Vec<RgbImage>) -> Self {
        Self {
            info,
            frames: frames.into(),
        }
    }

    /// `count` frames of one colour.
    pub fn solid(width: u32, height: u32, fps: FrameRate, count: u64, color: [u8; 3]) -> Self {
        let info = VideoInfo {
            width,
            height,
            fps,
            frame_count: count,
            duration_secs: fps.frame_time(count),
            has_audio: false,
        };
        let frames = (0..count)
            .map(|_| RgbImage::from_pixel(width, height, Rgb(color)))
            .collect();
        Self::new(info, frames)
    }
}

impl FrameSource for MemoryFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> FitoverlayResult<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }
}
