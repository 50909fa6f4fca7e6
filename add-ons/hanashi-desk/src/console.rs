//! Terminal rendition of the desk window.
//!
//! The chat log goes to stdout; everything else (avatar frames, slides, button
//! state) is only traced.

use hanashi_voice::{Controls, DisplaySurface, Frame, Geometry, Severity, StatusLine};
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct ConsoleSurface {
    avatar_frames: u64,
    slides: u64,
    controls: Option<Controls>,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

/// ANSI colour for a chat-log tag.
fn ansi(severity: Severity) -> &'static str {
    match severity {
        Severity::Plain => "\x1b[0m",
        Severity::Success => "\x1b[32m",
        Severity::Reply => "\x1b[34m",
        Severity::Error => "\x1b[31m",
        Severity::Forced => "\x1b[35m",
    }
}

impl DisplaySurface for ConsoleSurface {
    fn post_status(&mut self, line: &StatusLine) {
        println!("{}{}\x1b[0m", ansi(line.severity), line.render());
    }

    fn show_avatar(&mut self, frame: &Frame) {
        self.avatar_frames += 1;
        trace!("avatar frame #{} ({}x{})", self.avatar_frames, frame.width(), frame.height());
    }

    fn set_presentation_visible(&mut self, visible: bool) {
        debug!("🖼️ Slideshow region {}", if visible { "shown" } else { "hidden" });
    }

    fn show_slide(&mut self, frame: &Frame) {
        self.slides += 1;
        debug!("🖼️ Slide #{} ({}x{})", self.slides, frame.width(), frame.height());
    }

    fn set_window_geometry(&mut self, geometry: Geometry) {
        debug!("🪟 Window -> {}", geometry);
    }

    fn set_controls(&mut self, controls: &Controls) {
        if self.controls.as_ref() != Some(controls) {
            debug!(
                start = controls.start,
                stop = controls.stop,
                force_stop = controls.force_stop,
                slideshow_start = controls.slideshow_start,
                slideshow_stop = controls.slideshow_stop,
                "🎛️ Controls"
            );
            self.controls = Some(*controls);
        }
    }
}
