//! Tracing subscriber setup for the CLI and tests.
//!
//! Logs go to stderr so `info --json` and friends keep stdout clean.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Tracing targets owned by this workspace.
pub const WORKSPACE_TARGETS: &[&str] = &[
    "fitoverlay",
    "fitoverlay_common",
    "fitoverlay_track",
    "fitoverlay_overlay",
    "fitoverlay_render_engine",
];

/// Filter directives for `config`.
///
/// `verbose` raises the workspace targets to `debug` and leaves everything
/// else at the configured level, so dependency chatter stays quiet.
pub fn filter_directives(config: &LoggingConfig, verbose: bool) -> String {
    let base = match config.level.trim() {
        "" => "info",
        level => level,
    };
    if !verbose {
        return base.to_string();
    }
    let mut directives = vec![base.to_string()];
    directives.extend(WORKSPACE_TARGETS.iter().map(|t| format!("{t}=debug")));
    directives.join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> bool {
    let directives = filter_directives(config, verbose);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&directives).unwrap_or_else(|e| {
            eprintln!("invalid log filter '{directives}' ({e}), using info");
            EnvFilter::new("info")
        })
    });

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        let subscriber = builder
            .with_target(verbose)
            .with_thread_ids(verbose)
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    };

    if installed {
        tracing::debug!(filter = %directives, json = config.json, "Logging initialised");
    }
    installed
}
