//! Voice activity detection using WebRTC VAD, gated by an energy threshold
//!
//! WebRTC VAD alone fires on steady background noise; the gate calibrated from
//! ambient audio keeps fans and hum from opening a phrase.

use crate::error::{AgentError, AgentResult};
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Frame length WebRTC VAD is fed with.
pub const FRAME_MS: u32 = 30;

/// WebRTC VAD over fixed 30 ms frames.
pub struct VadDetector {
    vad: Vad,
    sample_rate: u32,
    frame_len: usize,
}

fn vad_mode(mode: u8) -> AgentResult<VadMode> {
    match mode {
        0 => Ok(VadMode::Quality),
        1 => Ok(VadMode::LowBitrate),
        2 => Ok(VadMode::Aggressive),
        3 => Ok(VadMode::VeryAggressive),
        other => Err(AgentError::Vad(format!("VAD mode must be 0-3, got {}", other))),
    }
}

fn vad_rate(sample_rate: u32) -> AgentResult<SampleRate> {
    match sample_rate {
        8000 => Ok(SampleRate::Rate8kHz),
        16000 => Ok(SampleRate::Rate16kHz),
        32000 => Ok(SampleRate::Rate32kHz),
        48000 => Ok(SampleRate::Rate48kHz),
        other => Err(AgentError::Vad(format!(
            "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
            other
        ))),
    }
}

impl VadDetector {
    pub fn new(sample_rate: u32, mode: u8) -> AgentResult<Self> {
        let rate = vad_rate(sample_rate)?;
        let mode = vad_mode(mode)?;

        let mut vad = Vad::new();
        vad.set_mode(mode);
        vad.set_sample_rate(rate);

        let frame_len = (sample_rate * FRAME_MS / 1000) as usize;
        info!("🎙️ WebRTC VAD ready ({}Hz, {} samples per frame)", sample_rate, frame_len);
        Ok(Self {
            vad,
            sample_rate,
            frame_len,
        })
    }

    /// Whether one frame of exactly [`frame_len`](Self::frame_len) samples contains speech.
    pub fn is_voice(&mut self, frame: &[f32]) -> AgentResult<bool> {
        if frame.len() != self.frame_len {
            return Err(AgentError::Vad(format!(
                "Expected {} samples, got {}",
                self.frame_len,
                frame.len()
            )));
        }
        let pcm: Vec<i16> = frame
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        self.vad
            .is_voice_segment(&pcm)
            .map_err(|e| AgentError::Vad(format!("VAD processing failed: {:?}", e)))
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Root mean square of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// VAD plus a minimum energy level.
pub struct SpeechGate {
    vad: VadDetector,
    threshold: f32,
}

impl SpeechGate {
    pub fn new(vad: VadDetector, threshold: f32) -> Self {
        Self { vad, threshold }
    }

    /// Calibrate the energy threshold from ambient audio: `max(rms * ratio, floor)`.
    pub fn calibrated(vad: VadDetector, ambient: &[f32], ratio: f32, floor: f32) -> Self {
        let threshold = (rms(ambient) * ratio).max(floor);
        debug!("Ambient rms {:.4}, speech threshold {:.4}", rms(ambient), threshold);
        Self::new(vad, threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn frame_len(&self) -> usize {
        self.vad.frame_len()
    }

    pub fn is_speech(&mut self, frame: &[f32]) -> AgentResult<bool> {
        if rms(frame) < self.threshold {
            return Ok(false);
        }
        self.vad.is_voice(frame)
    }
}
