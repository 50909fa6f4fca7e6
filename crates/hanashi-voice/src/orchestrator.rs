//! Turn orchestrator: start/stop/force-stop and the conversation loop.
//!
//! Each loop iteration is one [`TurnWorker`] task. The worker does the blocking
//! parts (listen, synthesize, play) on the blocking pool and hops back onto the
//! scheduler for every state change:
//!
//! ```text
//!  worker                         scheduler (Desk)
//!  ──────                         ────────────────
//!                         ──────▶ begin_iteration     stop check, pick input
//!  capture (blocking)
//!                         ──────▶ compose_reply       Listening → … → Synthesizing, commands
//!  synthesize (blocking)
//!                         ──────▶ begin_delivery      → Speaking, avatar on
//!  play (blocking)
//!                         ──────▶ finish_delivery     avatar off, → Listening | Idle
//! ```
//!
//! Workers carry the run epoch they were spawned in; a forced stop bumps the epoch
//! so late results from an abandoned worker are dropped on arrival. An abandoned
//! worker may still be blocked in `capture()`, so a run started meanwhile waits for
//! that capture to come back before it listens.
//!
//! The state stays `Listening` for the whole capture, which covers both hearing the
//! phrase and transcribing it. `compose_reply` then walks Recognizing → Composing →
//! Synthesizing inside one scheduler job, so those two states are never observed
//! from outside; they exist to keep the transition table honest.

use crate::audio::AudioClip;
use crate::command::{CommandToken, ResizeDirection};
use crate::desk::{Desk, Ports};
use crate::error::{AgentError, AgentResult};
use crate::intent::{reply_text, Reply, Transcript};
use crate::scheduler::SchedulerHandle;
use crate::status::Severity;
use crate::synthesis;
use crate::turn::TurnState;
use tracing::{debug, error, info, warn};

const SEPARATOR: &str = "--------------------";

/// Where the next utterance comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Utterance {
    Typed(String),
    Microphone,
}

impl Desk {
    /// Start a conversation run. No-op while running or without a microphone.
    ///
    /// `availability` is checked by the caller on the blocking pool.
    pub(crate) fn start(&mut self, availability: AgentResult<()>) {
        if self.turn.state() != TurnState::Idle {
            debug!("Conversation already running ({})", self.turn.state());
            return;
        }
        if !self.record_microphone(availability) {
            self.update_controls();
            return;
        }
        if self.begin_run(false, None) {
            self.announce(Severity::Success, "会話を開始します。話しかけてください。");
        }
    }

    /// Graceful stop: the in-flight iteration finishes, then the run winds down.
    pub(crate) fn stop(&mut self) {
        if !self.turn.state().is_active() || self.run.stop_requested {
            debug!("Nothing to stop ({})", self.turn.state());
            return;
        }
        self.run.stop_requested = true;
        info!("🛑 Stop requested");
        self.announce(Severity::Error, "会話を終了します。");
        self.update_controls();
    }

    /// Immediate stop: tear down the avatar, silence playback, drop the in-flight worker.
    pub(crate) fn force_stop(&mut self) {
        if self.turn.state() == TurnState::Idle {
            debug!("Nothing to force-stop");
            return;
        }
        self.run.stop_requested = true;
        self.run.epoch += 1;
        self.run.pending_input.clear();
        self.run.deferred_start = None;
        if let Some(timer) = self.run.next_iteration.take() {
            timer.cancel();
        }

        self.avatar.end_speaking(self.surface.as_mut());
        self.ports.sink.stop();

        if let Err(e) = self.turn.wind_down() {
            error!("❌ Forced stop left the turn machine inconsistent: {}", e);
        }
        warn!("⚡ Conversation force-stopped");
        self.announce(Severity::Forced, "会話を強制終了します。");
        self.update_controls();
    }

    /// Typed chat input. Idle: one single-shot turn. Running: replaces the next listen.
    pub(crate) fn submit_typed_input(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        match self.turn.state() {
            TurnState::Idle => {
                self.begin_run(true, Some(text));
            }
            state if state.is_active() && !self.run.stop_requested => {
                debug!("Queued typed input for the next turn");
                self.run.pending_input.push_back(text);
            }
            state => debug!("Typed input ignored while {} (stop requested)", state),
        }
    }

    fn begin_run(&mut self, single_shot: bool, first_input: Option<String>) -> bool {
        if let Err(e) = self.turn.transition(TurnState::Listening) {
            warn!("⚠️ Cannot start run: {}", e);
            return false;
        }
        self.run.epoch += 1;
        self.run.stop_requested = false;
        self.run.farewell = false;
        self.run.single_shot = single_shot;
        self.run.pending_input = first_input.into_iter().collect();
        info!("🗣️ Run {} started (single_shot: {})", self.run.epoch, single_shot);
        self.update_controls();
        if self.run.capture_in_flight && !single_shot {
            info!("⏳ Run {} waits for the previous capture to return", self.run.epoch);
            self.run.deferred_start = Some(self.run.epoch);
        } else {
            self.spawn_iteration(self.run.epoch);
        }
        true
    }

    pub(crate) fn spawn_iteration(&mut self, epoch: u64) {
        self.run.next_iteration = None;
        if epoch != self.run.epoch {
            return;
        }
        let worker = TurnWorker {
            sched: self.sched.clone(),
            ports: self.ports.clone(),
            epoch,
            raw_rate: self.config.voicevox.sample_rate,
        };
        tokio::spawn(worker.run());
    }

    fn is_current(&self, epoch: u64, expected: TurnState) -> bool {
        let current = epoch == self.run.epoch && self.turn.state() == expected;
        if !current {
            debug!(
                "Dropping stale worker step (epoch {} vs {}, state {})",
                epoch,
                self.run.epoch,
                self.turn.state()
            );
        }
        current
    }

    /// Walk Stopping → Idle and publish the result.
    fn finish_run(&mut self) {
        if let Err(e) = self.turn.wind_down() {
            error!("❌ {}", e);
        }
        self.run.pending_input.clear();
        info!("🏁 Run {} finished", self.run.epoch);
        self.update_controls();
    }

    /// Top of an iteration. `None` ends the worker.
    pub(crate) fn begin_iteration(&mut self, epoch: u64) -> Option<Utterance> {
        if !self.is_current(epoch, TurnState::Listening) {
            return None;
        }
        if self.run.stop_requested {
            self.finish_run();
            return None;
        }
        self.announce(Severity::Plain, SEPARATOR);
        match self.run.pending_input.pop_front() {
            Some(text) => Some(Utterance::Typed(text)),
            None if self.run.single_shot => {
                // A single-shot run always starts with its text; nothing left to answer.
                self.finish_run();
                None
            }
            None => {
                debug!("👂 Listening on the microphone");
                self.run.capture_in_flight = true;
                Some(Utterance::Microphone)
            }
        }
    }

    /// The microphone is free again; release a run that was waiting for it.
    fn capture_returned(&mut self) {
        self.run.capture_in_flight = false;
        if let Some(epoch) = self.run.deferred_start.take() {
            debug!("Capture returned, starting deferred run {}", epoch);
            self.spawn_iteration(epoch);
        }
    }

    /// Record the transcript, classify, dispatch commands. Ends in Synthesizing.
    pub(crate) fn compose_reply(&mut self, epoch: u64, typed: bool, transcript: Transcript) -> Option<Reply> {
        if !typed {
            self.capture_returned();
        }
        if !self.is_current(epoch, TurnState::Listening) {
            return None;
        }
        self.step(TurnState::Recognizing)?;
        match (transcript.utterance(), transcript.error) {
            (Some(text), _) if typed => self.announce(Severity::Plain, format!("あなた: {}", text)),
            (Some(text), _) => self.announce(Severity::Plain, format!("あなた (音声): 「{}」", text)),
            (None, Some(kind)) => self.announce(Severity::Error, format!("音声認識: {}", kind)),
            (None, None) => self.announce(Severity::Error, "音声認識: 音声を認識できませんでした"),
        }

        self.step(TurnState::Composing)?;
        let text = reply_text(self.ports.classifier.as_ref(), &transcript);
        let commands = self.dispatcher.extract(&text);
        self.announce(Severity::Reply, format!("AI: {}", text));

        self.step(TurnState::Synthesizing)?;
        for command in &commands {
            self.apply_command(*command);
        }
        Some(Reply { text, commands })
    }

    fn step(&mut self, to: TurnState) -> Option<()> {
        match self.turn.transition(to) {
            Ok(_) => Some(()),
            Err(e) => {
                error!("❌ {}", e);
                None
            }
        }
    }

    /// Queue the side effect of one command. Never blocks the turn.
    pub(crate) fn apply_command(&mut self, command: CommandToken) {
        debug!("⚙️ Command {:?}", command);
        match command {
            CommandToken::Resize(direction) => {
                let window = &self.config.window;
                let target = match direction {
                    ResizeDirection::Larger => window.larger,
                    ResizeDirection::Smaller => window.smaller,
                };
                let default = window.default;
                self.sched.post(move |desk: &mut Desk| desk.apply_geometry(target));
                // Detached: dropping the handle leaves the reset armed.
                let _reset = self
                    .sched
                    .post_after(window.reset_delay(), move |desk: &mut Desk| desk.apply_geometry(default));
            }
            CommandToken::SlideshowStart => {
                self.sched.post(|desk: &mut Desk| desk.slideshow_play());
            }
            CommandToken::SlideshowStop => {
                self.sched.post(|desk: &mut Desk| desk.slideshow_pause());
            }
            CommandToken::SlideshowNext => {
                self.sched.post(|desk: &mut Desk| desk.slideshow_next());
            }
            CommandToken::Farewell => {
                self.run.farewell = true;
            }
        }
    }

    /// Synthesizing → Speaking. Returns the clip to play, if any; `None` ends the worker.
    pub(crate) fn begin_delivery(&mut self, epoch: u64, audio: AgentResult<AudioClip>) -> Option<Option<AudioClip>> {
        if !self.is_current(epoch, TurnState::Synthesizing) {
            return None;
        }
        self.step(TurnState::Speaking)?;
        match audio {
            Ok(clip) if !clip.is_empty() => {
                self.announce(Severity::Plain, "AI [発話中]...");
                self.avatar.begin_speaking(self.surface.as_mut(), &self.sched);
                Some(Some(clip))
            }
            Ok(_) => {
                warn!("⚠️ Synthesis returned no audio");
                self.announce(Severity::Error, "音声合成エラー: 音声データが空です。");
                Some(None)
            }
            Err(e) => {
                warn!("⚠️ Synthesis failed: {}", e);
                self.announce(Severity::Error, format!("音声合成エラー: {}", e));
                Some(None)
            }
        }
    }

    /// Leave Speaking: loop back to Listening or end the run.
    pub(crate) fn finish_delivery(&mut self, epoch: u64, playback: AgentResult<()>) {
        if !self.is_current(epoch, TurnState::Speaking) {
            return;
        }
        if let Err(e) = playback {
            warn!("⚠️ Playback failed: {}", e);
            self.announce(Severity::Error, format!("音声再生エラー: {}", e));
        }
        self.avatar.end_speaking(self.surface.as_mut());

        if self.run.farewell || self.run.stop_requested || self.run.single_shot {
            if self.run.farewell && !self.run.stop_requested {
                self.announce(Severity::Error, "会話を終了します。");
            }
            self.finish_run();
            return;
        }

        if self.step(TurnState::Listening).is_none() {
            return;
        }
        let pause = self.config.turn.inter_turn_pause();
        self.run.next_iteration = Some(
            self.sched
                .post_after(pause, move |desk: &mut Desk| desk.spawn_iteration(epoch)),
        );
    }
}

/// One loop iteration, run as a tokio task.
struct TurnWorker {
    sched: SchedulerHandle<Desk>,
    ports: Ports,
    epoch: u64,
    raw_rate: u32,
}

impl TurnWorker {
    async fn run(self) {
        if let Err(e) = self.iterate().await {
            debug!("Turn worker ended: {}", e);
        }
    }

    async fn iterate(self) -> AgentResult<()> {
        let epoch = self.epoch;

        let Some(source) = self.sched.call(move |d| d.begin_iteration(epoch)).await? else {
            return Ok(());
        };

        let typed = matches!(source, Utterance::Typed(_));
        let transcript = match source {
            Utterance::Typed(text) => Transcript::recognized(text),
            Utterance::Microphone => {
                let capture = self.ports.capture.clone();
                Transcript::from_capture(blocking(move || capture.capture()).await)
            }
        };

        let Some(reply) = self
            .sched
            .call(move |d| d.compose_reply(epoch, typed, transcript))
            .await?
        else {
            return Ok(());
        };

        let synthesizer = self.ports.synthesizer.clone();
        let raw_rate = self.raw_rate;
        let text = reply.text;
        let audio = blocking(move || synthesis::render(synthesizer.as_ref(), &text, raw_rate)).await;

        let Some(clip) = self.sched.call(move |d| d.begin_delivery(epoch, audio)).await? else {
            return Ok(());
        };

        let playback = match clip {
            Some(clip) => {
                let sink = self.ports.sink.clone();
                blocking(move || sink.play(&clip)).await
            }
            None => Ok(()),
        };

        self.sched
            .call(move |d| d.finish_delivery(epoch, playback))
            .await
    }
}

/// Run `f` on the blocking pool, folding a panicked task into an error.
pub(crate) async fn blocking<T, F>(f: F) -> AgentResult<T>
where
    F: FnOnce() -> AgentResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AgentError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::CaptureErrorKind;
    use crate::test_support::{desk_on, desk_with_counting_clip, ClipCounter, TallySurface};

    async fn desk_in(state: TurnState, counter: &ClipCounter) -> Desk {
        let mut desk = desk_with_counting_clip(counter.clone());
        if state == TurnState::Speaking {
            desk.turn.force(TurnState::Synthesizing);
            desk.avatar.begin_speaking(desk.surface.as_mut(), &desk.sched);
        }
        desk.turn.force(state);
        desk
    }

    #[tokio::test]
    async fn force_stop_from_every_state_releases_and_idles() {
        for state in TurnState::ALL {
            let counter = ClipCounter::default();
            let mut desk = desk_in(state, &counter).await;
            desk.force_stop();
            assert_eq!(desk.turn.state(), TurnState::Idle, "from {state}");
            assert_eq!(counter.live(), 0, "decode handle leaked from {state}");
            assert!(!desk.avatar.is_speaking());
        }
    }

    #[tokio::test]
    async fn force_stop_invalidates_in_flight_steps() {
        let counter = ClipCounter::default();
        let mut desk = desk_in(TurnState::Synthesizing, &counter).await;
        let epoch = desk.run.epoch;
        desk.force_stop();
        let clip = AudioClip {
            samples: vec![0; 10],
            sample_rate: 24_000,
            channels: 1,
        };
        assert!(desk.begin_delivery(epoch, Ok(clip)).is_none());
        assert_eq!(counter.opened(), 0);
        assert_eq!(desk.turn.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn illegal_step_abandons_the_iteration() {
        let counter = ClipCounter::default();
        let mut desk = desk_in(TurnState::Listening, &counter).await;
        let epoch = desk.run.epoch;
        // Already past Listening: compose must refuse.
        desk.turn.force(TurnState::Composing);
        assert!(desk
            .compose_reply(epoch, true, Transcript::recognized("こんにちは"))
            .is_none());
    }

    #[tokio::test]
    async fn restart_waits_for_the_abandoned_capture() {
        let counter = ClipCounter::default();
        let mut desk = desk_with_counting_clip(counter);
        desk.start(Ok(()));
        let first = desk.run.epoch;
        assert_eq!(desk.begin_iteration(first), Some(Utterance::Microphone));

        desk.force_stop();
        desk.start(Ok(()));
        let second = desk.run.epoch;
        assert_ne!(first, second);
        assert_eq!(desk.turn.state(), TurnState::Listening);
        assert_eq!(desk.run.deferred_start, Some(second));

        // The old capture comes back: its result is dropped and the new run is released.
        assert!(desk
            .compose_reply(first, false, Transcript::failed(CaptureErrorKind::Timeout))
            .is_none());
        assert!(!desk.run.capture_in_flight);
        assert_eq!(desk.run.deferred_start, None);
        assert_eq!(desk.turn.state(), TurnState::Listening);
    }

    #[tokio::test]
    async fn restart_without_a_pending_capture_is_not_deferred() {
        let counter = ClipCounter::default();
        let mut desk = desk_with_counting_clip(counter);
        desk.start(Ok(()));
        desk.force_stop();
        desk.start(Ok(()));
        assert_eq!(desk.run.deferred_start, None);
    }

    #[tokio::test]
    async fn empty_synthesis_is_reported() {
        let surface = TallySurface::default();
        let mut desk = desk_on(ClipCounter::default(), Box::new(surface.clone()));
        desk.turn.force(TurnState::Synthesizing);
        let epoch = desk.run.epoch;
        let empty = AudioClip {
            samples: Vec::new(),
            sample_rate: 24_000,
            channels: 1,
        };

        assert_eq!(desk.begin_delivery(epoch, Ok(empty)), Some(None));
        assert!(surface.saw("音声合成エラー: 音声データが空です。"));
        assert!(!desk.avatar.is_speaking());
    }

    #[tokio::test]
    async fn compose_reply_passes_through_to_synthesizing() {
        let surface = TallySurface::default();
        let mut desk = desk_on(ClipCounter::default(), Box::new(surface.clone()));
        desk.turn.force(TurnState::Listening);
        let epoch = desk.run.epoch;

        let reply = desk.compose_reply(epoch, true, Transcript::recognized("こんにちは"));
        assert!(reply.is_some());
        assert_eq!(desk.turn.state(), TurnState::Synthesizing);
        assert!(surface.saw("あなた: こんにちは"));
    }
}
