//! # Hanashi Voice - desktop conversational agent core
//!
//! A speaking avatar that listens, answers from a keyword table, talks back through
//! a VOICEVOX engine and, on request, drives a looping slideshow.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── Scheduler<Desk> ─────────────────────────────┐
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌───────────┐  │
//! │  │ Turn machine │   │    Avatar    │   │ Presentation │   │  Surface  │  │
//! │  │ (orchestr.)  │──▶│ (clip ticks) │   │ (slide ticks)│──▶│ (display) │  │
//! │  └──────────────┘   └──────────────┘   └──────────────┘   └───────────┘  │
//! │         ▲  │ commands (queued jobs)            ▲                         │
//! │         │  └───────────────────────────────────┘                         │
//! └─────────┼────────────────────────────────────────────────────────────────┘
//!           │ call()
//!  ┌────────┴─────────┐   spawn_blocking   ┌──────────────────────────────┐
//!  │ TurnWorker (task)│ ─────────────────▶ │ capture · synthesis · sink   │
//!  └──────────────────┘                    │ (cpal+VAD+STT, VOICEVOX, rodio)│
//!                                          └──────────────────────────────┘
//! ```
//!
//! All visible state lives in [`Desk`] and is only touched by scheduler jobs.
//! Start the agent with [`launch`] and drive it through the returned [`AgentHandle`].

pub mod audio;
pub mod avatar;
pub mod capture;
pub mod clip;
pub mod command;
pub mod config;
pub mod desk;
pub mod error;
pub mod intent;
mod orchestrator;
pub mod presentation;
pub mod scale;
pub mod scheduler;
pub mod segment;
pub mod status;
pub mod stt;
pub mod surface;
pub mod synthesis;
pub mod turn;
pub mod vad;

pub use audio::{AudioClip, AudioSink, NullSink, RodioSink};
pub use avatar::{AvatarController, SpeakingAsset};
pub use capture::{list_input_devices, MicrophoneCapture, SpeechCapture};
pub use clip::{ClipSource, FrameSequenceClip, FrameStream, GifClip};
pub use command::{CommandDispatcher, CommandToken, ResizeDirection, TriggerTable};
pub use config::AgentConfig;
pub use desk::{AgentParts, Desk, Ports};
pub use error::{AgentError, AgentResult};
pub use intent::{CaptureErrorKind, IntentClassifier, KeywordClassifier, Reply, ReplyTable, Transcript};
pub use presentation::{MediaItem, PresentationController, PresentationState};
pub use scheduler::{Scheduler, SchedulerHandle, TimerHandle};
pub use status::{Controls, Severity, StatusLine};
pub use stt::{HttpTranscriber, Transcriber};
pub use surface::{DisplaySurface, Frame, Geometry};
pub use synthesis::{SpeechSynthesizer, VoicevoxClient};
pub use turn::{TurnMachine, TurnState};

use orchestrator::blocking;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Spawn the scheduler with a fresh [`Desk`] and queue the startup job.
///
/// Must be called inside a tokio runtime.
pub fn launch(parts: AgentParts) -> AgentHandle {
    let scheduler = Scheduler::new();
    let sched = scheduler.handle();
    let capture = parts.ports.capture.clone();
    let desk = Desk::new(parts, sched.clone());
    let runner = tokio::spawn(scheduler.run(desk));
    sched.post(|desk: &mut Desk| desk.startup());

    let device = capture.clone();
    let reporter = sched.clone();
    tokio::spawn(async move {
        let availability = blocking(move || device.availability()).await;
        reporter.post(move |desk: &mut Desk| {
            desk.record_microphone(availability);
            desk.update_controls();
        });
    });

    info!("🚀 Hanashi agent launched");
    AgentHandle { sched, runner, capture }
}

/// Async front door to a running agent. Every call is queued on the scheduler.
pub struct AgentHandle {
    sched: SchedulerHandle<Desk>,
    runner: JoinHandle<Desk>,
    capture: Arc<dyn SpeechCapture>,
}

impl AgentHandle {
    /// Begin listening. Ignored while a run is active or without a microphone.
    ///
    /// The device check runs on the blocking pool before the start job is queued.
    pub async fn start(&self) -> AgentResult<()> {
        let capture = self.capture.clone();
        let availability = blocking(move || capture.availability()).await;
        self.sched.call(move |d: &mut Desk| d.start(availability)).await
    }

    /// Finish the current turn, then stop.
    pub async fn stop(&self) -> AgentResult<()> {
        self.sched.call(|d: &mut Desk| d.stop()).await
    }

    /// Stop now: silence audio, drop the animation, discard the in-flight turn.
    pub async fn force_stop(&self) -> AgentResult<()> {
        self.sched.call(|d: &mut Desk| d.force_stop()).await
    }

    /// Chat box input. Starts a one-turn run when idle.
    pub async fn submit_typed_input(&self, text: impl Into<String>) -> AgentResult<()> {
        let text = text.into();
        self.sched.call(move |d: &mut Desk| d.submit_typed_input(text)).await
    }

    /// User-driven window resize.
    pub async fn resize_window(&self, geometry: Geometry) -> AgentResult<()> {
        self.sched.call(move |d: &mut Desk| d.apply_geometry(geometry)).await
    }

    pub async fn slideshow_play(&self) -> AgentResult<()> {
        self.sched.call(|d: &mut Desk| d.slideshow_play()).await
    }

    pub async fn slideshow_pause(&self) -> AgentResult<()> {
        self.sched.call(|d: &mut Desk| d.slideshow_pause()).await
    }

    pub async fn slideshow_next(&self) -> AgentResult<()> {
        self.sched.call(|d: &mut Desk| d.slideshow_next()).await
    }

    pub async fn turn_state(&self) -> AgentResult<TurnState> {
        self.sched.call(|d: &mut Desk| d.turn_state()).await
    }

    pub async fn controls(&self) -> AgentResult<Controls> {
        self.sched.call(|d: &mut Desk| d.controls()).await
    }

    /// Read anything off the desk from inside the scheduler.
    pub async fn inspect<F, R>(&self, f: F) -> AgentResult<R>
    where
        F: FnOnce(&Desk) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.sched.call(move |d: &mut Desk| f(d)).await
    }

    /// Stop the slideshow, force-stop any run and shut the scheduler down.
    pub async fn close(self) -> AgentResult<()> {
        self.sched.call(|d: &mut Desk| d.close()).await?;
        self.runner
            .await
            .map_err(|e| AgentError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        info!("👋 Hanashi agent closed");
        Ok(())
    }
}
