//! Speech capture port and the microphone implementation.
//!
//! One [`SpeechCapture::capture`] call is one listen: ambient calibration,
//! VAD-gated phrase detection, then transcription. Everything runs on the calling
//! (blocking) thread and the input stream is dropped before returning.

use crate::config::RecognitionConfig;
use crate::error::{AgentError, AgentResult};
use crate::segment::{PhraseSegmenter, Segment};
use crate::stt::Transcriber;
use crate::vad::{SpeechGate, VadDetector};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to wait for the input stream before calling it stalled.
const STREAM_STALL: Duration = Duration::from_secs(2);

/// Blocking listen that yields recognized text.
pub trait SpeechCapture: Send + Sync {
    /// `Err(ConfigurationMissing)` when there is nothing to listen with.
    fn availability(&self) -> AgentResult<()>;

    /// Listen once.
    ///
    /// Errors: `CaptureTimeout` when nobody spoke, `CaptureUnintelligible` when the
    /// phrase produced no text, `RecognitionService` when the backend failed.
    fn capture(&self) -> AgentResult<String>;
}

/// Names of the available input devices.
pub fn list_input_devices() -> AgentResult<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Default microphone + [`Transcriber`].
pub struct MicrophoneCapture {
    config: RecognitionConfig,
    transcriber: Arc<dyn Transcriber>,
}

impl MicrophoneCapture {
    pub fn new(config: RecognitionConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        Self { config, transcriber }
    }

    fn samples(&self, ms: u64) -> usize {
        (self.config.sample_rate as u64 * ms / 1000) as usize
    }

    fn record_phrase(&self) -> AgentResult<Vec<f32>> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AgentError::ConfigurationMissing("no input device".to_string()))?;
        let supported = device.default_input_config()?;
        let stream_config: StreamConfig = supported.config();
        debug!(
            "🎤 Input {} at {}Hz x{} ({:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            stream_config.sample_rate.0,
            stream_config.channels,
            supported.sample_format()
        );

        let (tx, rx) = mpsc::channel();
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, tx)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, tx)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, tx)?,
            other => {
                return Err(AgentError::AudioDevice(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        };
        stream.play()?;

        let mut reader = FrameReader {
            rx,
            resampler: LinearResampler::new(stream_config.sample_rate.0, self.config.sample_rate),
            pending: Vec::new(),
        };

        let ambient = reader.take(self.samples(self.config.ambient_adjust_ms))?;
        let vad = VadDetector::new(self.config.sample_rate, self.config.vad_mode)?;
        let mut gate = SpeechGate::calibrated(vad, &ambient, self.config.energy_ratio, self.config.energy_floor);
        let frame_len = gate.frame_len();
        info!("👂 Listening (threshold {:.4})", gate.threshold());

        let mut segmenter = PhraseSegmenter::new((&self.config).into());
        loop {
            let frame = reader.take(frame_len)?;
            let speech = gate.is_speech(&frame)?;
            match segmenter.push(speech, &frame) {
                Segment::Pending => continue,
                Segment::Phrase(phrase) => return Ok(phrase),
                Segment::NoSpeech => return Err(AgentError::CaptureTimeout),
            }
        }
    }
}

impl SpeechCapture for MicrophoneCapture {
    fn availability(&self) -> AgentResult<()> {
        let devices = list_input_devices()?;
        if devices.is_empty() || cpal::default_host().default_input_device().is_none() {
            return Err(AgentError::ConfigurationMissing("no microphone available".to_string()));
        }
        debug!("Input devices: {:?}", devices);
        Ok(())
    }

    fn capture(&self) -> AgentResult<String> {
        let phrase = self.record_phrase()?;
        let text = self.transcriber.transcribe(&phrase, self.config.sample_rate)?;
        if text.trim().is_empty() {
            return Err(AgentError::CaptureUnintelligible);
        }
        Ok(text)
    }
}

fn build_stream<T>(device: &Device, config: &StreamConfig, tx: mpsc::Sender<Vec<f32>>) -> AgentResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| {
                    let sum: f32 = frame.iter().map(|&s| <f32 as FromSample<T>>::from_sample_(s)).sum();
                    sum / frame.len() as f32
                })
                .collect();
            let _ = tx.send(mono);
        },
        move |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}

/// Pulls mono chunks off the stream channel and hands out exact-length blocks.
struct FrameReader {
    rx: mpsc::Receiver<Vec<f32>>,
    resampler: LinearResampler,
    pending: Vec<f32>,
}

impl FrameReader {
    fn take(&mut self, len: usize) -> AgentResult<Vec<f32>> {
        while self.pending.len() < len {
            let chunk = self
                .rx
                .recv_timeout(STREAM_STALL)
                .map_err(|_| AgentError::AudioDevice("input stream stalled".to_string()))?;
            self.resampler.process(&chunk, &mut self.pending);
        }
        Ok(self.pending.drain(..len).collect())
    }
}

/// Linear interpolation between the device rate and the VAD rate.
struct LinearResampler {
    step: f64,
    phase: f64,
    prev: f32,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate as f64 / to_rate.max(1) as f64,
            phase: 0.0,
            prev: 0.0,
        }
    }

    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if (self.step - 1.0).abs() < f64::EPSILON {
            out.extend_from_slice(input);
            return;
        }
        for &sample in input {
            while self.phase < 1.0 {
                out.push(self.prev + (sample - self.prev) * self.phase as f32);
                self.phase += self.step;
            }
            self.phase -= 1.0;
            self.prev = sample;
        }
    }
}
