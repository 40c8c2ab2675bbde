//! fitoverlay Track Model
//!
//! Everything the overlay needs to know about the recorded activity:
//! - **Samples and tracks:** immutable, timestamp-sorted sensor readings
//! - **FIT decoding:** binary activity files into a [`Track`]
//! - **Time alignment:** interpolated sensor state at any video time
//! - **Geo helpers:** semicircle conversion and the equirectangular projection
//!
//! This crate does file I/O only in the FIT entry points; everything else
//! is pure computation over in-memory data.

pub mod align;
pub mod fit;
pub mod geo;
pub mod sample;
pub mod synthetic;

pub use align::{validate_coverage, AlignedSample, TimeAligner};
pub use fit::{parse_fit_bytes, parse_fit_file, ParseOptions};
pub use geo::GeoPoint;
pub use sample::{Sample, Track, TrackSummary};
