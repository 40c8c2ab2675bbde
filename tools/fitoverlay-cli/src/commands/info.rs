//! Show a summary of a FIT file.

use std::path::PathBuf;

use fitoverlay_track::{parse_fit_file, ParseOptions};

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let track = parse_fit_file(&path, &ParseOptions::default())
        .map_err(|e| anyhow::anyhow!("Failed to read track: {e}"))?;
    let summary = track.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Track: {}", path.display());
    if let Some(start) = summary.start_time {
        println!("  Started: {start}");
    }
    let secs = summary.duration_secs.round() as u64;
    println!(
        "  Duration: {}:{:02}:{:02} ({} samples)",
        secs / 3600,
        secs / 60 % 60,
        secs % 60,
        summary.samples
    );
    match summary.distance_m {
        Some(m) => println!("  Distance: {:.2} km", m / 1000.0),
        None => println!("  Distance: n/a"),
    }
    println!(
        "  GPS fixes: {}/{} ({:.0}%)",
        summary.gps_samples,
        summary.samples,
        100.0 * summary.gps_samples as f64 / summary.samples.max(1) as f64
    );
    match summary.heart_rate_range {
        Some((lo, hi)) => println!("  Heart rate: {lo:.0}-{hi:.0} bpm"),
        None => println!("  Heart rate: n/a"),
    }
    if let Some(p) = summary.max_power {
        println!("  Max power: {p:.0} W");
    }

    Ok(())
}
