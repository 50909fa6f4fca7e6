//! Speech synthesis port and the VOICEVOX engine client.

use crate::audio::AudioClip;
use crate::config::VoicevoxConfig;
use crate::error::{AgentError, AgentResult};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Two-step synthesis: build a query for `text`, then render it to audio bytes.
pub trait SpeechSynthesizer: Send + Sync {
    fn audio_query(&self, text: &str) -> AgentResult<Value>;

    /// Bytes are WAV or raw 16-bit PCM.
    fn synthesize(&self, query: &Value) -> AgentResult<Vec<u8>>;
}

/// Run both steps and decode the result. Blocking.
pub fn render(synth: &dyn SpeechSynthesizer, text: &str, raw_rate: u32) -> AgentResult<AudioClip> {
    let query = synth.audio_query(text)?;
    let bytes = synth.synthesize(&query)?;
    AudioClip::decode(&bytes, raw_rate)
}

/// Blocking client for a VOICEVOX-compatible engine.
#[derive(Debug, Clone)]
pub struct VoicevoxClient {
    base_url: String,
    speaker: u32,
    query_timeout: Duration,
    synthesis_timeout: Duration,
    client: reqwest::blocking::Client,
}

impl VoicevoxClient {
    pub fn new(config: &VoicevoxConfig) -> AgentResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| AgentError::SynthesisRequest(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            speaker: config.speaker,
            query_timeout: config.query_timeout(),
            synthesis_timeout: config.synthesis_timeout(),
            client,
        })
    }

    pub fn speaker(&self) -> u32 {
        self.speaker
    }
}

impl SpeechSynthesizer for VoicevoxClient {
    fn audio_query(&self, text: &str) -> AgentResult<Value> {
        let url = format!("{}/audio_query", self.base_url);
        let speaker = self.speaker.to_string();
        let res = self
            .client
            .post(&url)
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .timeout(self.query_timeout)
            .send()
            .map_err(|e| AgentError::SynthesisRequest(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(AgentError::SynthesisRequest(format!(
                "audio_query error {}: {}",
                status, body
            )));
        }
        let query: Value = res
            .json()
            .map_err(|e| AgentError::SynthesisRequest(e.to_string()))?;
        debug!("audio_query ok for {} chars", text.chars().count());
        Ok(query)
    }

    fn synthesize(&self, query: &Value) -> AgentResult<Vec<u8>> {
        let url = format!("{}/synthesis", self.base_url);
        let res = self
            .client
            .post(&url)
            .query(&[("speaker", self.speaker)])
            .json(query)
            .timeout(self.synthesis_timeout)
            .send()
            .map_err(|e| AgentError::SynthesisRender(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(AgentError::SynthesisRender(format!(
                "synthesis error {}: {}",
                status, body
            )));
        }
        let bytes = res
            .bytes()
            .map_err(|e| AgentError::SynthesisRender(e.to_string()))?;
        debug!("synthesis ok ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Vec<u8>);

    impl SpeechSynthesizer for Canned {
        fn audio_query(&self, text: &str) -> AgentResult<Value> {
            Ok(serde_json::json!({ "text": text }))
        }

        fn synthesize(&self, query: &Value) -> AgentResult<Vec<u8>> {
            assert_eq!(query["text"], "テスト");
            Ok(self.0.clone())
        }
    }

    #[test]
    fn render_runs_both_steps() {
        let clip = render(&Canned(vec![0, 0, 1, 0]), "テスト", 24_000).unwrap();
        assert_eq!(clip.samples, vec![0, 1]);
    }

    #[test]
    fn unreachable_engine_is_a_request_error() {
        let client = VoicevoxClient::new(&VoicevoxConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            query_timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();
        let err = client.audio_query("こんにちは").unwrap_err();
        assert!(matches!(err, AgentError::SynthesisRequest(_)));
    }
}
