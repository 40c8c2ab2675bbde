//! Render one composited frame to PNG.

use std::path::PathBuf;

use fitoverlay_common::config::AppConfig;
use fitoverlay_render_engine::{render_preview, JobInputs};

use super::OptionOverrides;

pub async fn run(
    config: &AppConfig,
    video: PathBuf,
    track: PathBuf,
    offset: f64,
    at: f64,
    out: PathBuf,
    overrides: OptionOverrides,
) -> anyhow::Result<()> {
    let options = overrides.apply(config.overlay.clone())?;
    let inputs = JobInputs::new(video, track, offset, config.output_dir.clone()).with_options(options);

    println!("Rendering preview at {at:.2}s of {}", inputs.video_path.display());
    let written = tokio::task::spawn_blocking(move || render_preview(&inputs, at, &out)).await??;
    println!("Preview written: {}", written.display());
    Ok(())
}
