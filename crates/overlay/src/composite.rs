//! Alpha compositing of an overlay layer onto a decoded video frame.

use image::{RgbImage, RgbaImage};

use fitoverlay_common::error::{FitoverlayError, FitoverlayResult};

/// Blend `overlay` onto `frame` in place (source-over, opaque destination).
///
/// Both images must have the same dimensions; `frame_index` only labels the
/// error.
pub fn composite_over(frame: &mut RgbImage, overlay: &RgbaImage, frame_index: u64) -> FitoverlayResult<()> {
    if frame.dimensions() != overlay.dimensions() {
        let (fw, fh) = frame.dimensions();
        let (ow, oh) = overlay.dimensions();
        return Err(FitoverlayError::render(
            frame_index,
            format!("overlay is {ow}x{oh} but the frame is {fw}x{fh}"),
        ));
    }

    for (dst, src) in frame.pixels_mut().zip(overlay.pixels()) {
        let alpha = src[3] as u32;
        match alpha {
            0 => {}
            255 => {
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2] = src[2];
            }
            _ => {
                let inv = 255 - alpha;
                for c in 0..3 {
                    dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * inv + 127) / 255) as u8;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn test_blend_modes() {
        let mut frame = RgbImage::from_pixel(3, 1, Rgb([100, 100, 100]));
        let mut overlay = RgbaImage::new(3, 1);
        overlay.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        overlay.put_pixel(2, 0, Rgba([0, 0, 0, 120]));

        composite_over(&mut frame, &overlay, 0).unwrap();
        assert_eq!(*frame.get_pixel(0, 0), Rgb([100, 100, 100]));
        assert_eq!(*frame.get_pixel(1, 0), Rgb([255, 255, 255]));
        // 100 * 135 / 255 = 52.9
        assert_eq!(*frame.get_pixel(2, 0), Rgb([53, 53, 53]));
    }

    #[test]
    fn test_size_mismatch_names_frame() {
        let mut frame = RgbImage::new(4, 4);
        let overlay = RgbaImage::new(2, 2);
        let err = composite_over(&mut frame, &overlay, 17).unwrap_err();
        assert_eq!(err.frame_index(), Some(17));
        assert_eq!(err.stage(), "render");
    }
}
