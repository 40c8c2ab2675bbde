//! Application configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Upper bound on the default render worker count.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where rendered videos are written when none is given.
    pub output_dir: PathBuf,

    /// Overlay and pipeline options.
    pub overlay: OverlayOptions,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Options that shape one processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayOptions {
    /// Minimap orientation.
    pub minimap_orientation: MinimapOrientation,

    /// Render worker count. `None` means `min(available_parallelism, 8)`.
    pub worker_count: Option<usize>,

    /// Hardware encoders to probe, highest priority first. The software
    /// encoder is always appended as the terminal fallback.
    pub encoder_priority: Vec<EncoderVendor>,

    /// Reorder buffer capacity as a multiple of the worker count.
    pub reorder_factor: usize,

    /// Fonts used by the data panel.
    pub fonts: FontConfig,
}

/// Font files for the data panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Font for values and icons.
    pub bold: PathBuf,

    /// Font for units.
    pub regular: PathBuf,
}

/// Minimap rotation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimapOrientation {
    /// North is always up.
    #[default]
    NorthUp,
    /// Direction of travel is always up.
    HeadingUp,
}

/// Video encoder families, in the order they are probed by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderVendor {
    Nvidia,
    Intel,
    Amd,
    Software,
}

impl EncoderVendor {
    /// Default probe order.
    pub const DEFAULT_PRIORITY: [EncoderVendor; 4] = [
        EncoderVendor::Nvidia,
        EncoderVendor::Intel,
        EncoderVendor::Amd,
        EncoderVendor::Software,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nvidia => "nvidia",
            Self::Intel => "intel",
            Self::Amd => "amd",
            Self::Software => "software",
        }
    }
}

impl fmt::Display for EncoderVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncoderVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nvidia" | "nvenc" => Ok(Self::Nvidia),
            "intel" | "qsv" => Ok(Self::Intel),
            "amd" | "amf" => Ok(Self::Amd),
            "software" | "cpu" | "libx264" => Ok(Self::Software),
            other => Err(format!(
                "unknown encoder '{other}' (expected nvidia, intel, amd, software)"
            )),
        }
    }
}

impl FromStr for MinimapOrientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "north-up" | "north" => Ok(Self::NorthUp),
            "heading-up" | "heading" => Ok(Self::HeadingUp),
            other => Err(format!(
                "unknown minimap orientation '{other}' (expected north-up, heading-up)"
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "fitoverlay=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            overlay: OverlayOptions::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            minimap_orientation: MinimapOrientation::NorthUp,
            worker_count: None,
            encoder_priority: EncoderVendor::DEFAULT_PRIORITY.to_vec(),
            reorder_factor: 4,
            fonts: FontConfig::default(),
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        let dir = PathBuf::from("/usr/share/fonts/truetype/dejavu");
        Self {
            bold: dir.join("DejaVuSans-Bold.ttf"),
            regular: dir.join("DejaVuSans.ttf"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl OverlayOptions {
    /// Resolved worker count, never zero.
    pub fn workers(&self) -> usize {
        match self.worker_count {
            Some(n) => n.max(1),
            None => default_worker_count(),
        }
    }

    /// Capacity of the reorder buffer for the resolved worker count.
    pub fn reorder_capacity(&self) -> usize {
        self.workers() * self.reorder_factor.max(1)
    }
}

/// `min(available_parallelism, 8)`.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("fitoverlay").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_workers_capped() {
        let opts = OverlayOptions::default();
        let workers = opts.workers();
        assert!(workers >= 1);
        assert!(workers <= MAX_DEFAULT_WORKERS);
        assert_eq!(opts.reorder_capacity(), workers * 4);
    }

    #[test]
    fn test_explicit_zero_workers_clamps_to_one() {
        let opts = OverlayOptions {
            worker_count: Some(0),
            ..OverlayOptions::default()
        };
        assert_eq!(opts.workers(), 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"overlay":{"minimap_orientation":"heading_up"}}"#).unwrap();
        assert_eq!(
            config.overlay.minimap_orientation,
            MinimapOrientation::HeadingUp
        );
        assert_eq!(
            config.overlay.encoder_priority,
            EncoderVendor::DEFAULT_PRIORITY.to_vec()
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_encoder_vendor_parsing() {
        assert_eq!("NVENC".parse::<EncoderVendor>(), Ok(EncoderVendor::Nvidia));
        assert_eq!("cpu".parse::<EncoderVendor>(), Ok(EncoderVendor::Software));
        assert!("voodoo".parse::<EncoderVendor>().is_err());
        assert_eq!(
            "heading_up".parse::<MinimapOrientation>(),
            Ok(MinimapOrientation::HeadingUp)
        );
    }
}
