//! Status lines and control enablement shown next to the chat log.

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

/// Colour-like tag for a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Transcripts and progress notes.
    Plain,
    /// Microphone ready, conversation started.
    Success,
    /// Text spoken by the agent.
    Reply,
    /// Failures and the graceful stop notice.
    Error,
    /// Forced stop.
    Forced,
}

impl Severity {
    /// Colour name for chat log tags.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Plain => "black",
            Severity::Success => "green",
            Severity::Reply => "blue",
            Severity::Error => "red",
            Severity::Forced => "purple",
        }
    }
}

/// One line in the chat log.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub at: DateTime<Local>,
    pub severity: Severity,
    pub text: String,
}

impl StatusLine {
    pub fn now(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            severity,
            text: text.into(),
        }
    }

    /// `[HH:MM:SS] text`
    pub fn render(&self) -> String {
        format!("[{}] {}", self.at.format("%H:%M:%S"), self.text)
    }

    /// Mirror the line into the tracing stream.
    pub(crate) fn trace(&self) {
        match self.severity {
            Severity::Error => error!(target: "hanashi::status", "{}", self.text),
            Severity::Forced => warn!(target: "hanashi::status", "{}", self.text),
            _ => info!(target: "hanashi::status", severity = self.severity.color(), "{}", self.text),
        }
    }
}

/// Which buttons are usable right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub force_stop: bool,
    pub slideshow_start: bool,
    pub slideshow_stop: bool,
}

impl Controls {
    /// Derive enablement from agent state.
    ///
    /// `running` means a conversation run is in progress; `draining` means a graceful
    /// stop was requested and only force-stop stays useful.
    pub fn derive(microphone_ready: bool, running: bool, draining: bool, slideshow_playing: bool) -> Self {
        Self {
            start: microphone_ready && !running,
            stop: running && !draining,
            force_stop: running,
            slideshow_start: !slideshow_playing,
            slideshow_stop: slideshow_playing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_disabled_without_microphone() {
        let c = Controls::derive(false, false, false, false);
        assert!(!c.start);
        assert!(!c.stop);
        assert!(c.slideshow_start);
    }

    #[test]
    fn draining_keeps_only_force_stop() {
        let c = Controls::derive(true, true, true, true);
        assert!(!c.start);
        assert!(!c.stop);
        assert!(c.force_stop);
        assert!(c.slideshow_stop);
        assert!(!c.slideshow_start);
    }

    #[test]
    fn render_prefixes_clock() {
        let line = StatusLine::now(Severity::Reply, "AI: こんにちは");
        let rendered = line.render();
        assert!(rendered.starts_with('['));
        assert!(rendered.ends_with("AI: こんにちは"));
        assert_eq!(line.severity.color(), "blue");
    }
}
