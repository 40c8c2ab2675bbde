//! Check ffmpeg and encoder availability.

use fitoverlay_common::config::{AppConfig, EncoderVendor};
use fitoverlay_render_engine::encoder::{EncoderProbe, EncoderSpec, FfmpegEncoderProbe};
use fitoverlay_render_engine::select_encoder;

pub fn run() -> anyhow::Result<()> {
    println!("fitoverlay System Check");
    println!("{}", "=".repeat(50));

    let probe = match FfmpegEncoderProbe::detect() {
        Ok(probe) => {
            println!("[OK] ffmpeg found");
            probe.with_trial_encode(true)
        }
        Err(e) => {
            println!("[FAIL] ffmpeg: {e}");
            println!();
            println!("Install ffmpeg and make sure it is on PATH.");
            return Ok(());
        }
    };

    for vendor in EncoderVendor::DEFAULT_PRIORITY {
        let spec = EncoderSpec::for_vendor(vendor);
        let status = if probe.is_available(vendor) { "OK" } else { "--" };
        println!("[{status}] {:<9} {}", vendor.as_str(), spec.codec);
    }

    let config = AppConfig::load();
    let chosen = select_encoder(&config.overlay.encoder_priority, &probe);
    println!();
    println!("Selected encoder: {chosen} ({})", EncoderSpec::for_vendor(chosen).codec);
    println!("Render workers: {}", config.overlay.workers());

    Ok(())
}
