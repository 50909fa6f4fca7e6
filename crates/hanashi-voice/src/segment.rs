//! Phrase segmentation: turns a stream of gated VAD frames into one phrase.
//!
//! Gap logic: a phrase opens on the first speech frame, closes after `pause` of
//! silence or when it reaches `phrase_limit`. If nothing opens within
//! `listen_timeout` the listen is over. Time is counted in samples, so the
//! segmenter is deterministic under test.

use crate::config::RecognitionConfig;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    pub sample_rate: u32,
    pub listen_timeout_ms: u64,
    pub phrase_limit_ms: u64,
    pub pause_ms: u64,
    pub min_phrase_ms: u64,
}

impl From<&RecognitionConfig> for SegmenterConfig {
    fn from(c: &RecognitionConfig) -> Self {
        Self {
            sample_rate: c.sample_rate,
            listen_timeout_ms: c.listen_timeout_ms,
            phrase_limit_ms: c.phrase_limit_ms,
            pause_ms: c.pause_ms,
            min_phrase_ms: c.min_phrase_ms,
        }
    }
}

/// Result of feeding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Keep feeding frames.
    Pending,
    /// A complete phrase.
    Phrase(Vec<f32>),
    /// No speech started before the listen timeout.
    NoSpeech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Speaking,
    Trailing,
}

pub struct PhraseSegmenter {
    config: SegmenterConfig,
    phase: Phase,
    waited: usize,
    silence: usize,
    buffer: Vec<f32>,
}

impl PhraseSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            phase: Phase::Waiting,
            waited: 0,
            silence: 0,
            buffer: Vec::new(),
        }
    }

    fn samples(&self, ms: u64) -> usize {
        (self.config.sample_rate as u64 * ms / 1000) as usize
    }

    pub fn push(&mut self, is_speech: bool, frame: &[f32]) -> Segment {
        match (self.phase, is_speech) {
            (Phase::Waiting, false) => {
                self.waited += frame.len();
                if self.waited >= self.samples(self.config.listen_timeout_ms) {
                    info!("⏱️ No speech within {} ms", self.config.listen_timeout_ms);
                    return Segment::NoSpeech;
                }
                Segment::Pending
            }
            (Phase::Waiting, true) => {
                debug!("🎤 Phrase opened");
                self.phase = Phase::Speaking;
                self.silence = 0;
                self.buffer.clear();
                self.buffer.extend_from_slice(frame);
                self.check_limits()
            }
            (_, true) => {
                self.phase = Phase::Speaking;
                self.silence = 0;
                self.buffer.extend_from_slice(frame);
                self.check_limits()
            }
            (_, false) => {
                self.phase = Phase::Trailing;
                self.silence += frame.len();
                self.buffer.extend_from_slice(frame);
                self.check_limits()
            }
        }
    }

    fn check_limits(&mut self) -> Segment {
        let limit_hit = self.buffer.len() >= self.samples(self.config.phrase_limit_ms);
        let pause_hit = self.phase == Phase::Trailing && self.silence >= self.samples(self.config.pause_ms);
        if !limit_hit && !pause_hit {
            return Segment::Pending;
        }

        let voiced = self.buffer.len().saturating_sub(self.silence);
        if voiced < self.samples(self.config.min_phrase_ms) {
            debug!("⏭️ Phrase too short ({} samples), ignoring", voiced);
            self.waited += self.buffer.len();
            self.reset();
            if self.waited >= self.samples(self.config.listen_timeout_ms) {
                return Segment::NoSpeech;
            }
            return Segment::Pending;
        }

        info!(
            "🎯 Phrase committed ({} samples, {})",
            self.buffer.len(),
            if limit_hit { "limit" } else { "pause" }
        );
        let phrase = std::mem::take(&mut self.buffer);
        self.reset();
        Segment::Phrase(phrase)
    }

    fn reset(&mut self) {
        self.phase = Phase::Waiting;
        self.silence = 0;
        self.buffer.clear();
    }
}
