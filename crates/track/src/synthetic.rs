//! Synthetic FIT generation for fixtures and demos.
//!
//! Encodes samples as a minimal but valid FIT activity: a `file_id`
//! message followed by one `record` message per sample. A new record
//! definition is emitted whenever the set of present fields changes, so
//! absent fields never need invalid-value sentinels.
//!
//! Samples are written in the order given; nothing is sorted here.

use std::path::Path;

use fitoverlay_common::error::FitoverlayResult;

use crate::fit::ParseOptions;
use crate::geo::{degrees_to_semicircles, GeoPoint, METERS_PER_DEGREE};
use crate::sample::Sample;

/// Seconds between the Unix epoch and the FIT epoch (1989-12-31T00:00:00Z).
pub const FIT_EPOCH_OFFSET_SECS: i64 = 631_065_600;

const HEADER_SIZE: u8 = 14;
const PROTOCOL_VERSION: u8 = 0x20;
const PROFILE_VERSION: u16 = 2132;

const MESG_FILE_ID: u16 = 0;
const MESG_RECORD: u16 = 20;

const BASE_ENUM: u8 = 0x00;
const BASE_UINT8: u8 = 0x02;
const BASE_UINT16: u8 = 0x84;
const BASE_SINT32: u8 = 0x85;
const BASE_UINT32: u8 = 0x86;

const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800, 0xB401,
    0x5000, 0x9C01, 0x8801, 0x4400,
];

/// FIT CRC-16 over `bytes`.
pub fn fit_crc(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |mut crc, &byte| {
        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[(byte & 0xF) as usize];
        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc ^ tmp ^ CRC_TABLE[((byte >> 4) & 0xF) as usize]
    })
}

/// Record fields in definition order: (field number, size, base type).
const RECORD_FIELDS: [(u8, u8, u8); 8] = [
    (253, 4, BASE_UINT32), // timestamp
    (0, 4, BASE_SINT32),   // position_lat
    (1, 4, BASE_SINT32),   // position_long
    (3, 1, BASE_UINT8),    // heart_rate
    (4, 1, BASE_UINT8),    // cadence
    (5, 4, BASE_UINT32),   // distance, 1/100 m
    (6, 2, BASE_UINT16),   // speed, 1/1000 m/s
    (7, 2, BASE_UINT16),   // power
];

fn field_mask(sample: &Sample) -> [bool; 8] {
    [
        true,
        sample.position.is_some(),
        sample.position.is_some(),
        sample.heart_rate.is_some(),
        sample.cadence.is_some(),
        sample.distance.is_some(),
        sample.speed.is_some(),
        sample.power.is_some(),
    ]
}

fn write_definition(out: &mut Vec<u8>, local: u8, global: u16, fields: &[(u8, u8, u8)]) {
    out.push(0x40 | local);
    out.push(0); // reserved
    out.push(0); // little endian
    out.extend_from_slice(&global.to_le_bytes());
    out.push(fields.len() as u8);
    for &(num, size, base) in fields {
        out.extend_from_slice(&[num, size, base]);
    }
}

/// Encode samples as a FIT activity whose `t = 0` is `start_unix_secs`.
///
/// Timestamps are whole seconds on the wire; cadence is written in FIT
/// units using the default [`ParseOptions::cadence_scale`].
pub fn encode_fit(samples: &[Sample], start_unix_secs: i64) -> Vec<u8> {
    let cadence_scale = ParseOptions::default().cadence_scale;
    let fit_start = (start_unix_secs - FIT_EPOCH_OFFSET_SECS).max(0) as u32;

    let mut data = Vec::new();
    write_definition(
        &mut data,
        0,
        MESG_FILE_ID,
        &[(0, 1, BASE_ENUM), (1, 2, BASE_UINT16), (4, 4, BASE_UINT32)],
    );
    data.push(0x00);
    data.push(4); // file type: activity
    data.extend_from_slice(&255u16.to_le_bytes()); // manufacturer: development
    data.extend_from_slice(&fit_start.to_le_bytes());

    let mut current_mask: Option<[bool; 8]> = None;
    for sample in samples {
        let mask = field_mask(sample);
        if current_mask != Some(mask) {
            let fields: Vec<(u8, u8, u8)> = RECORD_FIELDS
                .iter()
                .zip(mask.iter())
                .filter(|(_, present)| **present)
                .map(|(field, _)| *field)
                .collect();
            write_definition(&mut data, 1, MESG_RECORD, &fields);
            current_mask = Some(mask);
        }

        data.push(0x01);
        let ts = fit_start.saturating_add(sample.timestamp.max(0.0).round() as u32);
        data.extend_from_slice(&ts.to_le_bytes());
        if let Some(p) = sample.position {
            data.extend_from_slice(&degrees_to_semicircles(p.lat).to_le_bytes());
            data.extend_from_slice(&degrees_to_semicircles(p.lon).to_le_bytes());
        }
        if let Some(hr) = sample.heart_rate {
            data.push(hr.round().clamp(0.0, 254.0) as u8);
        }
        if let Some(cad) = sample.cadence {
            data.push((cad / cadence_scale).round().clamp(0.0, 254.0) as u8);
        }
        if let Some(d) = sample.distance {
            data.extend_from_slice(&((d * 100.0).round().max(0.0) as u32).to_le_bytes());
        }
        if let Some(v) = sample.speed {
            let raw = (v * 1000.0).round().clamp(0.0, 65_534.0) as u16;
            data.extend_from_slice(&raw.to_le_bytes());
        }
        if let Some(w) = sample.power {
            let raw = w.round().clamp(0.0, 65_534.0) as u16;
            data.extend_from_slice(&raw.to_le_bytes());
        }
    }

    let mut out = Vec::with_capacity(HEADER_SIZE as usize + data.len() + 2);
    out.push(HEADER_SIZE);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&PROFILE_VERSION.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(b".FIT");
    let header_crc = fit_crc(&out);
    out.extend_from_slice(&header_crc.to_le_bytes());
    out.extend_from_slice(&data);
    let file_crc = fit_crc(&out);
    out.extend_from_slice(&file_crc.to_le_bytes());
    out
}

/// Encode and write a FIT file.
pub fn write_fit(path: &Path, samples: &[Sample], start_unix_secs: i64) -> FitoverlayResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, encode_fit(samples, start_unix_secs))?;
    Ok(())
}

/// A steady run: one sample per second for `seconds + 1` samples.
///
/// Heart rate starts at `start_hr` and rises by one bpm per second; the
/// runner holds 3 m/s heading east from 47.0N 8.0E, with 170 spm cadence
/// and 250 W power.
pub fn steady_run(seconds: u32, start_hr: f64) -> Vec<Sample> {
    const SPEED: f64 = 3.0;
    let origin = GeoPoint::new(47.0, 8.0);
    let deg_per_m_lon = 1.0 / (METERS_PER_DEGREE * origin.lat.to_radians().cos());

    (0..=seconds)
        .map(|i| {
            let t = i as f64;
            let east_m = SPEED * t;
            Sample {
                timestamp: t,
                position: Some(GeoPoint::new(origin.lat, origin.lon + east_m * deg_per_m_lon)),
                heart_rate: Some(start_hr + t),
                speed: Some(SPEED),
                cadence: Some(170.0),
                distance: Some(east_m),
                power: Some(250.0),
            }
        })
        .collect()
}
