//! Shared fakes for the scenario tests.

#![allow(dead_code)]

use hanashi_voice::config::PresentationConfig;
use hanashi_voice::intent::CaptureErrorKind;
use hanashi_voice::{
    launch, AgentConfig, AgentError, AgentHandle, AgentParts, AgentResult, AudioClip, AudioSink,
    AvatarController, Controls, DisplaySurface, Frame, Geometry, IntentClassifier, KeywordClassifier,
    Ports, PresentationController, SpeakingAsset, SpeechCapture, SpeechSynthesizer, StatusLine, TurnState,
};
use image::{Rgba, RgbaImage};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Everything the agent put on screen.
#[derive(Debug, Default)]
pub struct Screen {
    pub statuses: Vec<StatusLine>,
    pub geometries: Vec<Geometry>,
    pub avatar_frames: usize,
    pub slides: usize,
    pub presentation_visible: bool,
    pub controls: Option<Controls>,
}

#[derive(Clone, Default)]
pub struct RecordingSurface {
    pub screen: Arc<Mutex<Screen>>,
}

impl RecordingSurface {
    pub fn texts(&self) -> Vec<String> {
        self.screen.lock().unwrap().statuses.iter().map(|l| l.text.clone()).collect()
    }

    pub fn saw(&self, text: &str) -> bool {
        self.texts().iter().any(|t| t.contains(text))
    }

    pub fn geometries(&self) -> Vec<Geometry> {
        self.screen.lock().unwrap().geometries.clone()
    }
}

impl DisplaySurface for RecordingSurface {
    fn post_status(&mut self, line: &StatusLine) {
        self.screen.lock().unwrap().statuses.push(line.clone());
    }

    fn show_avatar(&mut self, _frame: &Frame) {
        self.screen.lock().unwrap().avatar_frames += 1;
    }

    fn set_presentation_visible(&mut self, visible: bool) {
        self.screen.lock().unwrap().presentation_visible = visible;
    }

    fn show_slide(&mut self, _frame: &Frame) {
        self.screen.lock().unwrap().slides += 1;
    }

    fn set_window_geometry(&mut self, geometry: Geometry) {
        self.screen.lock().unwrap().geometries.push(geometry);
    }

    fn set_controls(&mut self, controls: &Controls) {
        self.screen.lock().unwrap().controls = Some(*controls);
    }
}

/// Replays queued results, then times out forever.
///
/// Delays are real sleeps on the calling (blocking pool) thread.
#[derive(Default)]
pub struct ScriptedCapture {
    script: Mutex<VecDeque<AgentResult<String>>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
    checks: AtomicUsize,
    check_delay_ms: AtomicU64,
    capture_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCapture {
    pub fn saying(lines: &[&str]) -> Arc<Self> {
        let capture = Self::default();
        {
            let mut script = capture.script.lock().unwrap();
            for line in lines {
                script.push_back(Ok(line.to_string()));
            }
        }
        Arc::new(capture)
    }

    pub fn push(&self, result: AgentResult<String>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How many `availability` checks ran.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn set_check_delay(&self, delay: Duration) {
        self.check_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_capture_delay(&self, delay: Duration) {
        self.capture_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Most captures ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SpeechCapture for ScriptedCapture {
    fn availability(&self) -> AgentResult<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let delay = self.check_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AgentError::ConfigurationMissing("no microphone".to_string()));
        }
        Ok(())
    }

    fn capture(&self) -> AgentResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.capture_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AgentError::CaptureTimeout));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Returns 100 ms of raw silence for any text, or no bytes at all when `empty` is set.
#[derive(Default)]
pub struct FakeVoicevox {
    pub texts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub empty: AtomicBool,
}

impl SpeechSynthesizer for FakeVoicevox {
    fn audio_query(&self, text: &str) -> AgentResult<Value> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AgentError::SynthesisRequest("engine offline".to_string()));
        }
        self.texts.lock().unwrap().push(text.to_string());
        Ok(json!({ "text": text }))
    }

    fn synthesize(&self, _query: &Value) -> AgentResult<Vec<u8>> {
        if self.empty.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![0u8; 4_800])
    }
}

/// Plays instantly, or holds until stopped when `hold` is set.
#[derive(Default)]
pub struct FakeSink {
    pub played: AtomicUsize,
    pub stops: AtomicUsize,
    pub playing: AtomicBool,
    pub hold: AtomicBool,
    stopped: AtomicBool,
}

impl AudioSink for FakeSink {
    fn play(&self, _clip: &AudioClip) -> AgentResult<()> {
        self.played.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            for _ in 0..5_000 {
                if self.stopped.load(Ordering::SeqCst) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Keyword classifier that counts which branch answered.
#[derive(Default)]
pub struct SpyClassifier {
    inner: KeywordClassifier,
    pub classified: AtomicUsize,
    pub fallbacks: AtomicUsize,
}

impl IntentClassifier for SpyClassifier {
    fn classify(&self, utterance: &str) -> String {
        self.classified.fetch_add(1, Ordering::SeqCst);
        self.inner.classify(utterance)
    }

    fn fallback(&self, kind: CaptureErrorKind) -> String {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.fallback(kind)
    }
}

pub struct Harness {
    pub handle: AgentHandle,
    pub surface: RecordingSurface,
    pub capture: Arc<ScriptedCapture>,
    pub voicevox: Arc<FakeVoicevox>,
    pub sink: Arc<FakeSink>,
    pub classifier: Arc<SpyClassifier>,
}

pub fn still(shade: u8) -> Frame {
    RgbaImage::from_pixel(16, 16, Rgba([shade, shade, shade, 255]))
}

/// Launch an agent with a speaking still, the given slides and scripted speech.
pub fn harness(capture: Arc<ScriptedCapture>, slides: Vec<hanashi_voice::MediaItem>) -> Harness {
    init_tracing();
    let config = AgentConfig::default();
    let surface = RecordingSurface::default();
    let voicevox = Arc::new(FakeVoicevox::default());
    let sink = Arc::new(FakeSink::default());
    let classifier = Arc::new(SpyClassifier::default());

    let avatar = AvatarController::new(Some(still(255)), SpeakingAsset::Still(still(0)), &config.avatar);
    let presentation = PresentationController::new(slides, PresentationConfig::default());
    let parts = AgentParts {
        config,
        surface: Box::new(surface.clone()),
        ports: Ports {
            capture: capture.clone(),
            synthesizer: voicevox.clone(),
            sink: sink.clone(),
            classifier: classifier.clone(),
        },
        avatar,
        presentation,
    };

    Harness {
        handle: launch(parts),
        surface,
        capture,
        voicevox,
        sink,
        classifier,
    }
}

/// Poll until the turn machine reaches `state`. Gives up after ~5 s of (possibly paused) time.
pub async fn wait_for_state(handle: &AgentHandle, state: TurnState) -> bool {
    for _ in 0..500 {
        if handle.turn_state().await.ok() == Some(state) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Poll until `check` holds. Gives up after ~5 s.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
