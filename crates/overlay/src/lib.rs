//! fitoverlay Overlay Renderer
//!
//! Turns one aligned sensor sample into a transparent RGBA layer the size of
//! the video frame, and blends that layer onto decoded frames:
//! - **Data panel** (top-left): icon + value + unit per available metric
//! - **Route map** (top-right): the whole route, travelled part and position
//! - **Minimap** (bottom-right): a 100 m radius radar view around the athlete
//!
//! Every size derives from `min(width, height)`, so the overlay keeps its
//! proportions at any resolution. Rendering is stateless per frame; the
//! route map base layer is drawn once per job and reused.

pub mod composite;
pub mod draw;
pub mod layout;
pub mod minimap;
pub mod panel;
pub mod renderer;
pub mod route_map;
pub mod text;

pub use composite::composite_over;
pub use layout::OverlayLayout;
pub use renderer::{FrameContext, OverlayRenderer};
pub use text::FontSet;
