//! Decoded speech audio and the playback port.
//!
//! [`RodioSink`] plays through the default output device and honours `stop()` from
//! any thread, which is how a forced stop silences the agent mid-sentence.

use crate::error::{AgentError, AgentResult};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const PLAYBACK_POLL: Duration = Duration::from_millis(20);

/// 16-bit PCM ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    /// Unwrap a RIFF/WAVE container, or treat the bytes as raw mono i16 LE at `raw_rate`.
    pub fn decode(bytes: &[u8], raw_rate: u32) -> AgentResult<Self> {
        if bytes.starts_with(b"RIFF") {
            return Self::decode_wav(bytes);
        }
        if bytes.len() % 2 != 0 {
            return Err(AgentError::SynthesisRender(format!(
                "raw PCM has odd length {}",
                bytes.len()
            )));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self {
            samples,
            sample_rate: raw_rate,
            channels: 1,
        })
    }

    fn decode_wav(bytes: &[u8]) -> AgentResult<Self> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?,
            (hound::SampleFormat::Int, bits) if bits < 16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v << (16 - bits)))
                .collect::<Result<Vec<_>, _>>()?,
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<Vec<_>, _>>()?,
            (format, bits) => {
                return Err(AgentError::SynthesisRender(format!(
                    "unsupported WAV format {:?}/{} bits",
                    format, bits
                )))
            }
        };
        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

/// Blocking playback with an out-of-band stop.
pub trait AudioSink: Send + Sync {
    /// Play `clip` and return when it finished or `stop()` was called.
    fn play(&self, clip: &AudioClip) -> AgentResult<()>;

    /// Silence whatever is playing now.
    fn stop(&self);
}

/// Default output device through rodio.
///
/// `OutputStream` must stay on the thread that created it, so a small thread owns it
/// for the sink's lifetime and the `Sink` itself is shared.
pub struct RodioSink {
    sink: Arc<Sink>,
    stops: AtomicU64,
    _keepalive: mpsc::Sender<()>,
}

impl RodioSink {
    pub fn new() -> AgentResult<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<Sink>, String>>();
        let (keep_tx, keep_rx) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("hanashi-audio-out".to_string())
            .spawn(move || {
                let (stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                match Sink::try_new(&handle) {
                    Ok(sink) => {
                        let _ = ready_tx.send(Ok(Arc::new(sink)));
                        // Blocks until the RodioSink (and its sender) is dropped.
                        let _ = keep_rx.recv();
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                    }
                }
                drop(stream);
                debug!("Audio output thread finished");
            })?;

        let sink = ready_rx
            .recv()
            .map_err(|_| AgentError::Playback("audio output thread exited early".to_string()))?
            .map_err(AgentError::Playback)?;

        info!("🔊 Audio output ready");
        Ok(Self {
            sink,
            stops: AtomicU64::new(0),
            _keepalive: keep_tx,
        })
    }
}

impl AudioSink for RodioSink {
    fn play(&self, clip: &AudioClip) -> AgentResult<()> {
        if clip.is_empty() {
            return Ok(());
        }
        let generation = self.stops.load(Ordering::SeqCst);
        self.sink.append(SamplesBuffer::new(
            clip.channels,
            clip.sample_rate,
            clip.samples.clone(),
        ));
        self.sink.play();
        debug!("▶️ Playing {:?} of speech", clip.duration());

        while !self.sink.empty() {
            if self.stops.load(Ordering::SeqCst) != generation {
                debug!("Playback interrupted");
                break;
            }
            thread::sleep(PLAYBACK_POLL);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
        info!("⏹️ Audio playback stopped");
    }
}

/// Discards audio. Used when no output device is available.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&self, clip: &AudioClip) -> AgentResult<()> {
        warn!("No audio output; dropping {:?} of speech", clip.duration());
        Ok(())
    }

    fn stop(&self) {}
}
