//! Per-frame overlay rendering.

use image::{RgbImage, RgbaImage};

use fitoverlay_common::config::MinimapOrientation;
use fitoverlay_common::error::FitoverlayResult;
use fitoverlay_track::{AlignedSample, TimeAligner, Track};

use crate::composite::composite_over;
use crate::layout::OverlayLayout;
use crate::minimap::draw_minimap;
use crate::panel::{draw_panel, panel_lines};
use crate::route_map::RouteMap;
use crate::text::FontSet;

/// Everything the renderer needs to know about one video instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub aligned: AlignedSample,
    /// Pace in seconds per kilometer; `None` while stationary.
    pub pace: Option<f64>,
    /// Heading in degrees clockwise from north.
    pub heading: Option<f64>,
}

impl FrameContext {
    /// Query the aligner for video time `video_secs`.
    pub fn at(aligner: &TimeAligner<'_>, video_secs: f64) -> Self {
        Self {
            aligned: aligner.sample_at(video_secs),
            pace: aligner.pace_at(video_secs),
            heading: aligner.heading_at(video_secs),
        }
    }
}

/// Renders transparent overlay layers for one job.
///
/// Holds only per-job immutable state (layout, cached route map, fonts), so
/// a shared reference can be used from every render worker.
#[derive(Debug)]
pub struct OverlayRenderer<'a> {
    track: &'a Track,
    layout: OverlayLayout,
    route_map: Option<RouteMap>,
    fonts: Option<FontSet>,
    orientation: MinimapOrientation,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(track: &'a Track, width: u32, height: u32) -> Self {
        let layout = OverlayLayout::new(width, height);
        let route_map = RouteMap::new(track, &layout);
        if route_map.is_none() {
            tracing::info!("Track has no GPS positions, maps will not be drawn");
        }
        Self {
            track,
            layout,
            route_map,
            fonts: None,
            orientation: MinimapOrientation::default(),
        }
    }

    pub fn with_fonts(mut self, fonts: Option<FontSet>) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_orientation(mut self, orientation: MinimapOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn layout(&self) -> &OverlayLayout {
        &self.layout
    }

    pub fn has_fonts(&self) -> bool {
        self.fonts.is_some()
    }

    /// Render the overlay layer for one frame.
    pub fn render(&self, ctx: &FrameContext) -> RgbaImage {
        let mut canvas = RgbaImage::new(self.layout.width, self.layout.height);
        let sample = &ctx.aligned.sample;

        if let Some(fonts) = &self.fonts {
            let lines = panel_lines(sample, ctx.pace);
            draw_panel(&mut canvas, &self.layout, fonts, &lines);
        }

        if let Some(route_map) = &self.route_map {
            route_map.draw(&mut canvas, ctx.aligned.index, sample.position.as_ref());
            if let Some(position) = &sample.position {
                draw_minimap(
                    &mut canvas,
                    &self.layout,
                    self.track,
                    position,
                    ctx.aligned.index,
                    self.orientation,
                    ctx.heading,
                );
            }
        }
        canvas
    }

    /// Render the overlay for video time `video_secs`.
    pub fn render_at(&self, aligner: &TimeAligner<'_>, video_secs: f64) -> RgbaImage {
        self.render(&FrameContext::at(aligner, video_secs))
    }

    /// Render and blend the overlay for frame `index` onto `frame`.
    pub fn composite_frame(
        &self,
        aligner: &TimeAligner<'_>,
        index: u64,
        video_secs: f64,
        frame: &mut RgbImage,
    ) -> FitoverlayResult<()> {
        let overlay = self.render_at(aligner, video_secs);
        composite_over(frame, &overlay, index)
    }
}
