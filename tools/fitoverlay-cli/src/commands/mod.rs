pub mod check;
pub mod info;
pub mod preview;
pub mod process;
pub mod synth;

use fitoverlay_common::config::{EncoderVendor, MinimapOrientation, OverlayOptions};

/// Command-line overrides of the configured overlay options.
#[derive(Debug, Default)]
pub struct OptionOverrides {
    pub orientation: Option<String>,
    pub workers: Option<usize>,
    pub encoders: Option<String>,
}

impl OptionOverrides {
    pub fn apply(self, mut options: OverlayOptions) -> anyhow::Result<OverlayOptions> {
        if let Some(orientation) = self.orientation {
            options.minimap_orientation = orientation
                .parse::<MinimapOrientation>()
                .map_err(anyhow::Error::msg)?;
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                anyhow::bail!("--workers must be at least 1");
            }
            options.worker_count = Some(workers);
        }
        if let Some(encoders) = self.encoders {
            options.encoder_priority = parse_encoders(&encoders)?;
        }
        Ok(options)
    }
}

/// Comma-separated encoder list, in priority order.
pub fn parse_encoders(s: &str) -> anyhow::Result<Vec<EncoderVendor>> {
    let vendors = s
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| part.parse::<EncoderVendor>().map_err(anyhow::Error::msg))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if vendors.is_empty() {
        anyhow::bail!("--encoders needs at least one encoder");
    }
    Ok(vendors)
}

/// Parse `MM:SS`, `HH:MM:SS` or plain (possibly fractional) seconds.
pub fn parse_offset(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let parts: Vec<&str> = body.split(':').collect();
    let number = |p: &str| -> Result<f64, String> {
        p.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| format!("invalid time '{s}' (expected MM:SS, HH:MM:SS or seconds)"))
    };

    let secs = match parts.as_slice() {
        [secs] => number(secs)?,
        [mm, ss] => {
            let ss = number(ss)?;
            if ss >= 60.0 {
                return Err(format!("seconds out of range in '{s}'"));
            }
            number(mm)? * 60.0 + ss
        }
        [hh, mm, ss] => {
            let (mm, ss) = (number(mm)?, number(ss)?);
            if mm >= 60.0 || ss >= 60.0 {
                return Err(format!("minutes or seconds out of range in '{s}'"));
            }
            number(hh)? * 3600.0 + mm * 60.0 + ss
        }
        _ => return Err(format!("invalid time '{s}' (expected MM:SS, HH:MM:SS or seconds)")),
    };
    Ok(if negative { -secs } else { secs })
}
