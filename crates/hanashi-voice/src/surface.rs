//! The display surface: the only place visible state lands.
//!
//! Window toolkits implement [`DisplaySurface`]; the agent only ever calls it from
//! the scheduler, so implementations need no locking of their own.

use crate::status::{Controls, Severity, StatusLine};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Decoded RGBA frame as handed to the surface.
pub type Frame = RgbaImage;

/// Width/height pair in pixels, used for windows and display regions alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fraction of this geometry, never smaller than 1x1.
    pub fn scaled(&self, width_fraction: f32, height_fraction: f32) -> Geometry {
        Geometry {
            width: ((self.width as f32 * width_fraction) as u32).max(1),
            height: ((self.height as f32 * height_fraction) as u32).max(1),
        }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sink for everything the user sees.
pub trait DisplaySurface: Send {
    /// Append a timestamped status line to the chat log.
    fn post_status(&mut self, line: &StatusLine);

    /// Replace the avatar image.
    fn show_avatar(&mut self, frame: &Frame);

    /// Show or hide the slideshow region.
    fn set_presentation_visible(&mut self, visible: bool);

    /// Replace the slide currently drawn in the slideshow region.
    fn show_slide(&mut self, frame: &Frame);

    /// Resize the top-level window.
    fn set_window_geometry(&mut self, geometry: Geometry);

    /// Reflect button enablement.
    fn set_controls(&mut self, controls: &Controls);
}

/// Timestamp `text`, mirror it to the log and hand it to the surface.
pub(crate) fn announce(surface: &mut dyn DisplaySurface, severity: Severity, text: impl Into<String>) {
    let line = StatusLine::now(severity, text);
    line.trace();
    surface.post_status(&line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_regions_never_collapse() {
        let g = Geometry::new(950, 1080);
        assert_eq!(g.scaled(0.4, 0.3), Geometry::new(380, 324));
        assert_eq!(Geometry::new(0, 0).scaled(0.4, 0.3), Geometry::new(1, 1));
    }
}
