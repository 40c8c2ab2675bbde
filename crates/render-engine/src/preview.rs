//! Single-frame preview rendering.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context as _;
use image::{Rgba, RgbaImage, RgbImage};

use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};
use fitoverlay_overlay::{composite_over, FontSet, OverlayRenderer};
use fitoverlay_track::{parse_fit_file, TimeAligner, Track};

use crate::export::JobInputs;
use crate::source::probe_video;

/// Decode the frame shown at `at_secs`, or `None` if ffmpeg cannot.
pub fn extract_frame(video: &Path, at_secs: f64, width: u32, height: u32) -> Option<RgbImage> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-ss"])
        .arg(format!("{:.3}", at_secs.max(0.0)))
        .arg("-i")
        .arg(video)
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
        .stdin(Stdio::null())
        .output();

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ffmpeg could not extract preview frame"
            );
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "ffmpeg not available for preview background");
            return None;
        }
    };

    let expected = width as usize * height as usize * 3;
    if output.stdout.len() < expected {
        tracing::warn!(
            got = output.stdout.len(),
            expected,
            "Preview frame truncated, using transparent background"
        );
        return None;
    }
    let mut bytes = output.stdout;
    bytes.truncate(expected);
    RgbImage::from_raw(width, height, bytes)
}

/// Overlay for `at_secs` composited onto `background`, or on a transparent
/// canvas when there is none.
pub fn compose_preview(
    renderer: &OverlayRenderer<'_>,
    aligner: &TimeAligner<'_>,
    at_secs: f64,
    background: Option<RgbImage>,
) -> FitoverlayResult<RgbaImage> {
    let overlay = renderer.render_at(aligner, at_secs);
    match background {
        Some(mut frame) => {
            composite_over(&mut frame, &overlay, 0)?;
            Ok(RgbaImage::from_fn(frame.width(), frame.height(), |x, y| {
                let [r, g, b] = frame.get_pixel(x, y).0;
                Rgba([r, g, b, 255])
            }))
        }
        None => Ok(overlay),
    }
}

fn render_track_preview(
    track: &Track,
    inputs: &JobInputs,
    at_secs: f64,
    width: u32,
    height: u32,
    background: Option<RgbImage>,
) -> FitoverlayResult<RgbaImage> {
    let renderer = OverlayRenderer::new(track, width, height)
        .with_fonts(FontSet::load_or_bundled(&inputs.options.fonts))
        .with_orientation(inputs.options.minimap_orientation);
    let aligner = TimeAligner::new(track, inputs.offset_secs);
    compose_preview(&renderer, &aligner, at_secs, background)
}

/// Render the composited frame at video time `at_secs` to a PNG at `out`.
pub fn render_preview(inputs: &JobInputs, at_secs: f64, out: &Path) -> FitoverlayResult<PathBuf> {
    if !inputs.track_path.is_file() {
        return Err(FitoverlayError::FileNotFound {
            path: inputs.track_path.clone(),
        });
    }
    let track = parse_fit_file(&inputs.track_path, &inputs.parse)?;
    let info = probe_video(&inputs.video_path)?;
    let background = extract_frame(&inputs.video_path, at_secs, info.width, info.height);
    if background.is_none() {
        tracing::info!("Rendering preview on a transparent background");
    }

    let image = render_track_preview(&track, inputs, at_secs, info.width, info.height, background)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save(out)
        .with_context(|| format!("failed to write preview '{}'", out.display()))?;

    tracing::info!(output = %out.display(), at_secs, "Preview written");
    Ok(out.to_path_buf())
}
