//! Write a synthetic FIT file.

use std::path::PathBuf;

use fitoverlay_track::synthetic::{steady_run, write_fit};

/// Start time of generated activities (2024-01-01T08:00:00Z).
const SYNTH_START_UNIX: i64 = 1_704_096_000;

pub fn run(out: PathBuf, seconds: u32, start_hr: f64) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_fit(&out, &steady_run(seconds, start_hr), SYNTH_START_UNIX)?;
    println!("Wrote {seconds}s synthetic activity to {}", out.display());
    Ok(())
}
