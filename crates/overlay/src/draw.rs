//! Raster primitives on RGBA canvases.
//!
//! Shapes overwrite the pixels they cover (no blending); layers are
//! combined afterwards with [`image::imageops::overlay`] or
//! [`crate::composite::composite_over`].

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_polygon_mut};
use imageproc::point::Point;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const TRAVELLED: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// A straight segment with round caps, `width` pixels wide.
pub fn thick_line(canvas: &mut RgbaImage, from: (f64, f64), to: (f64, f64), width: f32, color: Rgba<u8>) {
    let half = width as f64 / 2.0;
    let cap = half.round().max(0.0) as i32;
    draw_filled_circle_mut(canvas, round_point(from), cap, color);
    draw_filled_circle_mut(canvas, round_point(to), cap, color);

    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = dx.hypot(dy);
    if len < 0.5 || half < 0.5 {
        return;
    }
    let (nx, ny) = (-dy / len * half, dx / len * half);
    let corners = [
        Point::new((from.0 + nx).round() as i32, (from.1 + ny).round() as i32),
        Point::new((to.0 + nx).round() as i32, (to.1 + ny).round() as i32),
        Point::new((to.0 - nx).round() as i32, (to.1 - ny).round() as i32),
        Point::new((from.0 - nx).round() as i32, (from.1 - ny).round() as i32),
    ];
    // draw_polygon_mut rejects explicitly closed polygons.
    if corners[0] != corners[3] {
        draw_polygon_mut(canvas, &corners, color);
    }
}

/// A connected polyline.
pub fn polyline(canvas: &mut RgbaImage, points: &[(f64, f64)], width: f32, color: Rgba<u8>) {
    for pair in points.windows(2) {
        thick_line(canvas, pair[0], pair[1], width, color);
    }
}

/// A filled disc.
pub fn disc(canvas: &mut RgbaImage, center: (f64, f64), radius: f64, color: Rgba<u8>) {
    draw_filled_circle_mut(canvas, round_point(center), radius.round() as i32, color);
}

/// A circle outline `width` pixels thick, growing inwards from `radius`.
pub fn ring(canvas: &mut RgbaImage, center: (f64, f64), radius: f64, width: f32, color: Rgba<u8>) {
    let outer = radius.round() as i32;
    let steps = (width.round() as i32).max(1);
    for i in 0..steps {
        if outer - i < 0 {
            break;
        }
        draw_hollow_circle_mut(canvas, round_point(center), outer - i, color);
    }
}

/// Clear every pixel outside the inscribed circle of a square canvas.
pub fn mask_circle(canvas: &mut RgbaImage) {
    let size = canvas.width().min(canvas.height()) as f64;
    let r = size / 2.0;
    for (x, y, px) in canvas.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - r;
        let dy = y as f64 + 0.5 - r;
        if dx * dx + dy * dy > r * r {
            *px = Rgba([0, 0, 0, 0]);
        }
    }
}

/// Source-over blend of `color` with `coverage` in `[0, 1]` onto one pixel.
pub fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
        return;
    }
    let src_a = color[3] as f32 / 255.0 * coverage.clamp(0.0, 1.0);
    if src_a <= 0.0 {
        return;
    }
    let dst = canvas.get_pixel_mut(x as u32, y as u32);
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    for c in 0..3 {
        let s = color[c] as f32 * src_a;
        let d = dst[c] as f32 * dst_a * (1.0 - src_a);
        dst[c] = ((s + d) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

fn round_point(p: (f64, f64)) -> (i32, i32) {
    (p.0.round() as i32, p.1.round() as i32)
}
