//! Render the overlay into a copy of a video.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fitoverlay_common::config::AppConfig;
use fitoverlay_render_engine::{process_with_cancel, run_job, JobContext, JobInputs, JobStatus};

use super::OptionOverrides;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn run(
    config: &AppConfig,
    video: PathBuf,
    track: PathBuf,
    offset: f64,
    output: Option<PathBuf>,
    overrides: OptionOverrides,
) -> anyhow::Result<()> {
    let options = overrides.apply(config.overlay.clone())?;
    let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
    let inputs = JobInputs::new(video, track, offset, output_dir).with_options(options);

    println!("Processing: {}", inputs.video_path.display());
    println!("  Track: {}", inputs.track_path.display());
    println!("  Offset: {:.1}s", inputs.offset_secs);
    println!("  Output: {}", inputs.output_path().display());
    println!("  Workers: {}", inputs.options.workers());

    let ctx = Arc::new(JobContext::new());

    let cancel = ctx.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling job");
            cancel.cancel();
        }
    });

    let job = {
        let ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || {
            run_job(&ctx, |reporter, cancel| process_with_cancel(&inputs, reporter, cancel))
        })
    };
    tokio::pin!(job);

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last_progress = None;
    let result = loop {
        tokio::select! {
            res = &mut job => break res?,
            _ = ticker.tick() => {
                let state = ctx.snapshot();
                if state.status == JobStatus::Running && last_progress != Some(state.progress) {
                    print!("\r  [{:>3}%] {}    ", state.progress, state.message);
                    last_progress = Some(state.progress);
                }
            }
        }
    };

    match result {
        Ok(path) => {
            println!("\nDone: {}", path.display());
            Ok(())
        }
        Err(e) => {
            let state = ctx.snapshot();
            println!("\nFailed during {}: {e}", state.error_stage.as_deref().unwrap_or("job"));
            Err(e.into())
        }
    }
}
