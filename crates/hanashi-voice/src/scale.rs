//! Aspect-fit scaling shared by the avatar and the slideshow.

use crate::surface::{Frame, Geometry};
use image::imageops::{self, FilterType};

/// Largest size with the source aspect ratio that fits inside `target`.
///
/// Both output dimensions are at least 1. A degenerate source or target keeps the
/// source size (ratio 1).
pub fn fit_within(source: Geometry, target: Geometry) -> Geometry {
    let ratio = if source.width > 0 && source.height > 0 && target.width > 0 && target.height > 0 {
        let ratio_w = target.width as f64 / source.width as f64;
        let ratio_h = target.height as f64 / source.height as f64;
        ratio_w.min(ratio_h)
    } else {
        1.0
    };

    Geometry {
        width: ((source.width as f64 * ratio) as u32).max(1),
        height: ((source.height as f64 * ratio) as u32).max(1),
    }
}

/// Resize `frame` to fit `target`, returning the frame untouched when it already fits exactly.
pub fn fit_frame(frame: &Frame, target: Geometry, filter: FilterType) -> Frame {
    let source = Geometry::new(frame.width(), frame.height());
    let fitted = fit_within(source, target);
    if fitted == source {
        return frame.clone();
    }
    imageops::resize(frame, fitted.width, fitted.height, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn fits_by_the_tighter_axis() {
        let out = fit_within(Geometry::new(400, 300), Geometry::new(380, 324));
        assert_eq!(out, Geometry::new(380, 285));

        let out = fit_within(Geometry::new(300, 600), Geometry::new(380, 324));
        assert_eq!(out, Geometry::new(162, 324));
    }

    #[test]
    fn never_below_one_pixel() {
        let out = fit_within(Geometry::new(4000, 10), Geometry::new(1, 1));
        assert_eq!(out, Geometry::new(1, 1));

        let out = fit_within(Geometry::new(0, 10), Geometry::new(50, 50));
        assert_eq!(out, Geometry::new(1, 10));
    }

    #[test]
    fn fit_frame_resizes_pixels() {
        let frame = Frame::from_pixel(40, 20, Rgba([10, 20, 30, 255]));
        let out = fit_frame(&frame, Geometry::new(10, 10), FilterType::Triangle);
        assert_eq!((out.width(), out.height()), (10, 5));
        let same = fit_frame(&out, Geometry::new(10, 5), FilterType::Triangle);
        assert_eq!((same.width(), same.height()), (10, 5));
    }
}
