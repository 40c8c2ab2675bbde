//! fitoverlay CLI: burn FIT sensor data into action-camera video.
//!
//! Usage:
//!   fitoverlay process --video V --track T --offset 01:30   Render a video
//!   fitoverlay preview --video V --track T --at 12 --out P  Render one frame
//!   fitoverlay info <TRACK>                                 Show track summary
//!   fitoverlay check                                        Report encoders
//!   fitoverlay synth --out F --seconds N                    Write a demo FIT

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fitoverlay_common::config::AppConfig;

mod commands;

use commands::parse_offset;

#[derive(Parser)]
#[command(
    name = "fitoverlay",
    about = "Overlay heart rate, pace, cadence and GPS maps from a FIT file onto video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the overlay into a copy of the video
    Process {
        /// Source video file
        #[arg(long)]
        video: PathBuf,

        /// FIT activity file
        #[arg(long)]
        track: PathBuf,

        /// Track time at the first video frame: MM:SS, HH:MM:SS or seconds
        #[arg(long, default_value = "0", value_parser = parse_offset, allow_hyphen_values = true)]
        offset: f64,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimap orientation: north-up|heading-up
        #[arg(long)]
        orientation: Option<String>,

        /// Number of render workers
        #[arg(long)]
        workers: Option<usize>,

        /// Encoder priority, comma separated: nvidia,intel,amd,software
        #[arg(long)]
        encoders: Option<String>,
    },

    /// Render a single composited frame to PNG
    Preview {
        /// Source video file
        #[arg(long)]
        video: PathBuf,

        /// FIT activity file
        #[arg(long)]
        track: PathBuf,

        /// Track time at the first video frame: MM:SS, HH:MM:SS or seconds
        #[arg(long, default_value = "0", value_parser = parse_offset, allow_hyphen_values = true)]
        offset: f64,

        /// Video time of the frame: MM:SS, HH:MM:SS or seconds
        #[arg(long, default_value = "0", value_parser = parse_offset)]
        at: f64,

        /// Output PNG path
        #[arg(long, default_value = "preview.png")]
        out: PathBuf,

        /// Minimap orientation: north-up|heading-up
        #[arg(long)]
        orientation: Option<String>,
    },

    /// Show a summary of a FIT file
    Info {
        /// FIT activity file
        track: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check ffmpeg and hardware encoder availability
    Check,

    /// Write a synthetic FIT file for demos and testing
    Synth {
        /// Output FIT path
        #[arg(long)]
        out: PathBuf,

        /// Activity length in seconds
        #[arg(long, default_value = "600")]
        seconds: u32,

        /// Heart rate at the first sample
        #[arg(long, default_value = "120")]
        start_hr: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    logging.json |= cli.json_logs;
    fitoverlay_common::logging::init_logging(&logging, cli.verbose);

    match cli.command {
        Commands::Process {
            video,
            track,
            offset,
            output,
            orientation,
            workers,
            encoders,
        } => {
            let overrides = commands::OptionOverrides {
                orientation,
                workers,
                encoders,
            };
            commands::process::run(&config, video, track, offset, output, overrides).await
        }
        Commands::Preview {
            video,
            track,
            offset,
            at,
            out,
            orientation,
        } => {
            let overrides = commands::OptionOverrides {
                orientation,
                ..Default::default()
            };
            commands::preview::run(&config, video, track, offset, at, out, overrides).await
        }
        Commands::Info { track, json } => commands::info::run(track, json),
        Commands::Check => commands::check::run(),
        Commands::Synth {
            out,
            seconds,
            start_hr,
        } => commands::synth::run(out, seconds, start_hr),
    }
}
