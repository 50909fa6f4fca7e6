//! The scheduler-owned state: surface, avatar, slideshow and the turn machine.
//!
//! Every method here runs as a scheduler job, so nothing in `Desk` is shared
//! across threads. The conversation loop itself lives in `orchestrator.rs`.

use crate::audio::AudioSink;
use crate::avatar::AvatarController;
use crate::capture::SpeechCapture;
use crate::command::CommandDispatcher;
use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::intent::{IntentClassifier, KeywordClassifier};
use crate::presentation::PresentationController;
use crate::scheduler::{SchedulerHandle, TimerHandle};
use crate::status::{Controls, Severity};
use crate::surface::{announce, DisplaySurface, Geometry};
use crate::synthesis::SpeechSynthesizer;
use crate::turn::TurnMachine;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// Blocking collaborators, shared with worker tasks.
#[derive(Clone)]
pub struct Ports {
    pub capture: Arc<dyn SpeechCapture>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub sink: Arc<dyn AudioSink>,
    pub classifier: Arc<dyn IntentClassifier>,
}

/// Everything [`crate::launch`] needs.
pub struct AgentParts {
    pub config: AgentConfig,
    pub surface: Box<dyn DisplaySurface>,
    pub ports: Ports,
    pub avatar: AvatarController,
    pub presentation: PresentationController,
}

impl AgentParts {
    /// Build the avatar, slideshow and keyword classifier from `config`.
    pub fn from_config(
        config: AgentConfig,
        surface: Box<dyn DisplaySurface>,
        capture: Arc<dyn SpeechCapture>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        let classifier: Arc<dyn IntentClassifier> = Arc::new(KeywordClassifier::new(config.replies.clone()));
        let avatar = AvatarController::from_config(&config);
        let folder = config.asset_path(&config.presentation.folder);
        let presentation = PresentationController::load(&folder, config.presentation.clone());
        Self {
            config,
            surface,
            ports: Ports {
                capture,
                synthesizer,
                sink,
                classifier,
            },
            avatar,
            presentation,
        }
    }
}

/// Per-run bookkeeping for the conversation loop.
#[derive(Debug, Default)]
pub(crate) struct RunControl {
    /// Bumped on every start and forced stop; workers carry the epoch they were spawned in.
    pub epoch: u64,
    pub stop_requested: bool,
    pub farewell: bool,
    /// Typed input started this run; it ends after one reply.
    pub single_shot: bool,
    pub pending_input: VecDeque<String>,
    pub next_iteration: Option<TimerHandle>,
    /// A worker is blocked in `capture()`; it may belong to an abandoned run.
    pub capture_in_flight: bool,
    /// Epoch whose first iteration waits for that capture to return.
    pub deferred_start: Option<u64>,
}

pub struct Desk {
    pub(crate) config: Arc<AgentConfig>,
    pub(crate) surface: Box<dyn DisplaySurface>,
    pub(crate) avatar: AvatarController,
    pub(crate) presentation: PresentationController,
    pub(crate) dispatcher: CommandDispatcher,
    pub(crate) ports: Ports,
    pub(crate) turn: TurnMachine,
    pub(crate) run: RunControl,
    pub(crate) sched: SchedulerHandle<Desk>,
    microphone_ready: bool,
    window: Geometry,
}

impl Desk {
    pub(crate) fn new(parts: AgentParts, sched: SchedulerHandle<Desk>) -> Self {
        let window = parts.config.window.default;
        Self {
            dispatcher: CommandDispatcher::new(parts.config.triggers.clone()),
            config: Arc::new(parts.config),
            surface: parts.surface,
            avatar: parts.avatar,
            presentation: parts.presentation,
            ports: parts.ports,
            turn: TurnMachine::new(),
            run: RunControl::default(),
            sched,
            microphone_ready: false,
            window,
        }
    }

    /// First job: size the window, publish controls. The microphone check reports
    /// back through [`Desk::record_microphone`] once it finishes off the scheduler.
    pub(crate) fn startup(&mut self) {
        self.apply_geometry(self.config.window.default);
        self.update_controls();
        info!("🖥️ Desk ready ({})", self.window);
    }

    /// Store the outcome of a `SpeechCapture::availability` check run on the blocking pool.
    pub(crate) fn record_microphone(&mut self, availability: AgentResult<()>) -> bool {
        match availability {
            Ok(()) => {
                if !self.microphone_ready {
                    self.announce(Severity::Success, "マイクの準備ができました。");
                }
                self.microphone_ready = true;
            }
            Err(e) => {
                warn!("⚠️ Microphone unavailable: {}", e);
                self.announce(
                    Severity::Error,
                    format!("エラー: マイクが使用できません。マイクが接続され、許可されていることを確認してください。({})", e),
                );
                self.microphone_ready = false;
            }
        }
        self.microphone_ready
    }

    pub fn window(&self) -> Geometry {
        self.window
    }

    pub fn avatar(&self) -> &AvatarController {
        &self.avatar
    }

    pub fn presentation(&self) -> &PresentationController {
        &self.presentation
    }

    pub fn turn_state(&self) -> crate::turn::TurnState {
        self.turn.state()
    }

    pub fn microphone_ready(&self) -> bool {
        self.microphone_ready
    }

    pub fn controls(&self) -> Controls {
        Controls::derive(
            self.microphone_ready,
            self.turn.state() != crate::turn::TurnState::Idle,
            self.run.stop_requested,
            self.presentation.is_playing(),
        )
    }

    pub(crate) fn update_controls(&mut self) {
        let controls = self.controls();
        self.surface.set_controls(&controls);
    }

    pub(crate) fn announce(&mut self, severity: Severity, text: impl Into<String>) {
        announce(self.surface.as_mut(), severity, text);
    }

    /// Resize the window and re-lay-out both regions.
    pub(crate) fn apply_geometry(&mut self, geometry: Geometry) {
        self.window = geometry;
        self.surface.set_window_geometry(geometry);
        self.avatar.on_resize(geometry, self.surface.as_mut());
        self.presentation.on_resize(geometry, self.surface.as_mut());
        info!("🪟 Window {}", geometry);
    }

    pub(crate) fn tick_avatar(&mut self, session: u64) {
        self.avatar.advance(session, self.surface.as_mut(), &self.sched);
    }

    pub(crate) fn tick_slideshow(&mut self) {
        self.presentation.tick(self.surface.as_mut(), &self.sched);
    }

    pub(crate) fn slideshow_play(&mut self) {
        self.presentation.play(self.surface.as_mut(), &self.sched);
        self.update_controls();
    }

    pub(crate) fn slideshow_pause(&mut self) {
        self.presentation.pause(self.surface.as_mut());
        self.update_controls();
    }

    pub(crate) fn slideshow_next(&mut self) {
        self.presentation.next(self.surface.as_mut());
    }

    /// Process exit: stop the slideshow, force down any run, end the scheduler.
    pub(crate) fn close(&mut self) {
        info!("👋 Closing desk");
        self.presentation.pause(self.surface.as_mut());
        self.force_stop();
        self.avatar.end_speaking(self.surface.as_mut());
        self.sched.shutdown();
    }
}
