//! **Speech-to-Text**: turn a captured phrase into text.
//!
//! [`HttpTranscriber`] talks to any OpenAI-compatible `/audio/transcriptions`
//! endpoint (OpenAI Whisper, a local whisper server, etc.) and passes the
//! configured language along.

use crate::config::RecognitionConfig;
use crate::error::{AgentError, AgentResult};
use std::io::Cursor;
use tracing::debug;

/// Converts mono f32 PCM into text. Empty string means nothing intelligible.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> AgentResult<String>;
}

/// Encode mono f32 PCM as 16-bit WAV for upload.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> AgentResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AgentError::RecognitionService(e.to_string()))?;
        for &s in samples {
            let value = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
            writer
                .write_sample(value)
                .map_err(|e| AgentError::RecognitionService(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AgentError::RecognitionService(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// OpenAI-compatible transcription API.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer key; local servers usually need none.
    pub api_key: Option<String>,
    pub model: String,
    /// ISO-639-1 code sent as `language`.
    pub language: String,
    client: reqwest::blocking::Client,
}

impl HttpTranscriber {
    pub fn new(config: &RecognitionConfig) -> AgentResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AgentError::RecognitionService(e.to_string()))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
            client,
        })
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> AgentResult<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }
        let wav = pcm_f32_to_wav(samples, sample_rate)?;
        let url = format!("{}/audio/transcriptions", self.base_url);
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("phrase.wav")
            .mime_str("audio/wav")
            .map_err(|e| AgentError::RecognitionService(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let res = request
            .send()
            .map_err(|e| AgentError::RecognitionService(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(AgentError::RecognitionService(format!(
                "STT API error {}: {}",
                status, body
            )));
        }
        let json: serde_json::Value = res
            .json()
            .map_err(|e| AgentError::RecognitionService(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        debug!("Transcribed {} samples -> {} chars", samples.len(), text.chars().count());
        Ok(text)
    }
}
