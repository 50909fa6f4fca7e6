//! Error types for the Hanashi agent

use crate::turn::TurnState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur anywhere between the microphone and the display surface
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("No speech detected before the listen timeout")]
    CaptureTimeout,

    #[error("Speech was detected but could not be understood")]
    CaptureUnintelligible,

    #[error("Recognition service error: {0}")]
    RecognitionService(String),

    #[error("Synthesis request error: {0}")]
    SynthesisRequest(String),

    #[error("Synthesis render error: {0}")]
    SynthesisRender(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Cannot open media {}: {reason}", path.display())]
    MediaOpen { path: PathBuf, reason: String },

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("VAD error: {0}")]
    Vad(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Illegal turn transition {from:?} -> {to:?}")]
    InvalidTransition { from: TurnState, to: TurnState },

    #[error("Scheduler is no longer running")]
    SchedulerClosed,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Convenience constructor for media failures.
    pub fn media(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AgentError::MediaOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<cpal::DevicesError> for AgentError {
    fn from(err: cpal::DevicesError) -> Self {
        AgentError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AgentError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AgentError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for AgentError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AgentError::AudioDevice(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for AgentError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AgentError::AudioDevice(err.to_string())
    }
}

impl From<hound::Error> for AgentError {
    fn from(err: hound::Error) -> Self {
        AgentError::SynthesisRender(format!("WAV decode failed: {}", err))
    }
}
