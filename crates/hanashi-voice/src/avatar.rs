//! Avatar animation controller.
//!
//! Shows the idle still between turns and, while the agent speaks, either loops a
//! clip or swaps to a speaking still. At most one [`AnimationSession`] exists; it
//! owns the open [`FrameStream`] and the pending frame tick, and both go away in
//! [`AvatarController::end_speaking`].

use crate::clip::{self, ClipSource, FrameStream};
use crate::config::{AgentConfig, SpeakingMode};
use crate::desk::Desk;
use crate::scale::fit_frame;
use crate::scheduler::{SchedulerHandle, TimerHandle};
use crate::status::Severity;
use crate::surface::{announce, DisplaySurface, Frame, Geometry};
use image::imageops::FilterType;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the avatar shows while speaking.
pub enum SpeakingAsset {
    Clip(Box<dyn ClipSource>),
    Still(Frame),
    /// Configured media could not be found; speaking keeps the idle image.
    Missing,
}

impl std::fmt::Debug for SpeakingAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeakingAsset::Clip(src) => write!(f, "Clip({})", src.location().display()),
            SpeakingAsset::Still(frame) => write!(f, "Still({}x{})", frame.width(), frame.height()),
            SpeakingAsset::Missing => f.write_str("Missing"),
        }
    }
}

/// The live speaking animation.
struct AnimationSession {
    id: u64,
    /// `None` for a speaking still.
    stream: Option<Box<dyn FrameStream>>,
    delay: Duration,
    tick: Option<TimerHandle>,
}

impl AnimationSession {
    fn release(mut self) {
        if let Some(tick) = self.tick.take() {
            tick.cancel();
        }
        // Dropping the stream releases the decode handle.
        self.stream.take();
        debug!("🧹 Animation session {} released", self.id);
    }
}

/// Per-frame delay for a clip: `1000 / fps` ms, or `fallback` when the rate is unusable.
pub fn frame_delay(frame_rate: Option<f64>, fallback: Duration) -> Duration {
    match frame_rate {
        Some(fps) if fps.is_finite() && fps > 0.0 => Duration::from_millis(((1000.0 / fps) as u64).max(1)),
        _ => fallback,
    }
}

#[derive(Debug)]
pub struct AvatarController {
    idle: Option<Frame>,
    speaking: SpeakingAsset,
    width_fraction: f32,
    height_fraction: f32,
    fallback_delay: Duration,
    region: Geometry,
    session: Option<AnimationSession>,
    next_session_id: u64,
}

impl std::fmt::Debug for AnimationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationSession")
            .field("id", &self.id)
            .field("streaming", &self.stream.is_some())
            .field("delay", &self.delay)
            .finish()
    }
}

impl AvatarController {
    pub fn new(idle: Option<Frame>, speaking: SpeakingAsset, config: &crate::config::AvatarConfig) -> Self {
        Self {
            idle,
            speaking,
            width_fraction: config.width_fraction,
            height_fraction: config.height_fraction,
            fallback_delay: config.fallback_frame_delay(),
            region: Geometry::new(1, 1),
            session: None,
            next_session_id: 0,
        }
    }

    /// Load idle and speaking media named in the configuration.
    ///
    /// Missing media is logged and degrades to the idle image (or nothing).
    pub fn from_config(config: &AgentConfig) -> Self {
        let avatar = &config.avatar;
        let idle_path = config.asset_path(&avatar.idle_image);
        let idle = match clip::load_frame(&idle_path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("⚠️ Idle avatar unavailable: {}", e);
                None
            }
        };

        let speaking = match avatar.speaking_mode {
            SpeakingMode::Clip => {
                let path = config.asset_path(&avatar.speaking_clip);
                if path.exists() {
                    SpeakingAsset::Clip(clip::clip_for_path(
                        &path,
                        avatar.sequence_fps,
                        &config.presentation.extensions,
                    ))
                } else {
                    warn!("⚠️ Speaking clip not found: {}", path.display());
                    SpeakingAsset::Missing
                }
            }
            SpeakingMode::Still => match clip::load_frame(&config.asset_path(&avatar.speaking_image)) {
                Ok(frame) => SpeakingAsset::Still(frame),
                Err(e) => {
                    warn!("⚠️ Speaking still unavailable: {}", e);
                    SpeakingAsset::Missing
                }
            },
        };

        info!("🧍 Avatar ready (idle: {}, speaking: {:?})", idle.is_some(), speaking);
        Self::new(idle, speaking, avatar)
    }

    pub fn is_speaking(&self) -> bool {
        self.session.is_some()
    }

    pub fn region(&self) -> Geometry {
        self.region
    }

    /// Start the speaking animation. Returns false when nothing was started.
    pub fn begin_speaking(&mut self, surface: &mut dyn DisplaySurface, sched: &SchedulerHandle<Desk>) -> bool {
        if let Some(session) = &self.session {
            debug!("Avatar already speaking (session {})", session.id);
            return false;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        match &self.speaking {
            SpeakingAsset::Clip(source) => {
                let stream = match source.open() {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("⚠️ Speaking clip failed to open: {}", e);
                        announce(surface, Severity::Error, format!("アバター動画を開けませんでした: {}", e));
                        return false;
                    }
                };
                let delay = frame_delay(stream.frame_rate(), self.fallback_delay);
                debug!("🎬 Animation session {} started ({:?} per frame)", id, delay);
                let tick = sched.post_after(Duration::ZERO, move |desk: &mut Desk| desk.tick_avatar(id));
                self.session = Some(AnimationSession {
                    id,
                    stream: Some(stream),
                    delay,
                    tick: Some(tick),
                });
                true
            }
            SpeakingAsset::Still(frame) => {
                surface.show_avatar(&fit_frame(frame, self.region, FilterType::Lanczos3));
                self.session = Some(AnimationSession {
                    id,
                    stream: None,
                    delay: Duration::ZERO,
                    tick: None,
                });
                true
            }
            SpeakingAsset::Missing => {
                debug!("No speaking media, keeping idle image");
                false
            }
        }
    }

    /// Advance the clip by one frame and schedule the next tick.
    ///
    /// Ticks from a session that has since ended are ignored.
    pub fn advance(&mut self, id: u64, surface: &mut dyn DisplaySurface, sched: &SchedulerHandle<Desk>) {
        let region = self.region;
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            debug!("Stale avatar tick {} ignored", id);
            return;
        };
        session.tick = None;
        let Some(stream) = session.stream.as_mut() else {
            return;
        };

        let next = match stream.next_frame() {
            Ok(None) => stream.rewind().and_then(|_| stream.next_frame()),
            other => other,
        };

        match next {
            Ok(Some(frame)) => {
                surface.show_avatar(&fit_frame(&frame, region, FilterType::Triangle));
                let delay = session.delay;
                session.tick = Some(sched.post_after(delay, move |desk: &mut Desk| desk.tick_avatar(id)));
            }
            Ok(None) => {
                warn!("⚠️ Speaking clip has no frames");
                announce(surface, Severity::Error, "アバター動画にフレームがありません。");
                self.end_speaking(surface);
            }
            Err(e) => {
                warn!("⚠️ Speaking clip decode failed: {}", e);
                announce(surface, Severity::Error, format!("アバター動画の再生エラー: {}", e));
                self.end_speaking(surface);
            }
        }
    }

    /// Tear down the session and show the idle image. Safe to call when idle.
    pub fn end_speaking(&mut self, surface: &mut dyn DisplaySurface) {
        if let Some(session) = self.session.take() {
            session.release();
            self.show_idle(surface);
        }
    }

    /// New window size: recompute the region and redraw stills now; clips catch up on their next tick.
    pub fn on_resize(&mut self, window: Geometry, surface: &mut dyn DisplaySurface) {
        self.region = window.scaled(self.width_fraction, self.height_fraction);
        match &self.session {
            None => self.show_idle(surface),
            Some(session) if session.stream.is_none() => {
                if let SpeakingAsset::Still(frame) = &self.speaking {
                    surface.show_avatar(&fit_frame(frame, self.region, FilterType::Lanczos3));
                }
            }
            Some(_) => {}
        }
    }

    fn show_idle(&self, surface: &mut dyn DisplaySurface) {
        if let Some(idle) = &self.idle {
            surface.show_avatar(&fit_frame(idle, self.region, FilterType::Lanczos3));
        }
    }
}
