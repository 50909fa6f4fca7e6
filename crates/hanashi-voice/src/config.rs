//! Agent configuration loaded from defaults, `config/hanashi.toml` and `HANASHI__*` env vars.
//!
//! Every collaborator receives its section at construction; nothing reads the
//! environment after startup.

use crate::command::TriggerTable;
use crate::error::AgentResult;
use crate::intent::ReplyTable;
use crate::surface::Geometry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Used when `HANASHI_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/hanashi.toml";

/// Top-level configuration.
///
/// | Source | Example |
/// |--------|---------|
/// | defaults | `AgentConfig::default()` |
/// | file | `HANASHI_CONFIG` or `config/hanashi.toml` |
/// | env | `HANASHI__VOICEVOX__SPEAKER=3` |
/// | STT key | `HANASHI_STT_API_KEY` or `STT_API_KEY` when the file leaves it empty |
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Relative media paths resolve against this directory.
    pub assets_dir: PathBuf,
    pub voicevox: VoicevoxConfig,
    pub recognition: RecognitionConfig,
    pub window: WindowConfig,
    pub avatar: AvatarConfig,
    pub presentation: PresentationConfig,
    pub turn: TurnConfig,
    pub triggers: TriggerTable,
    pub replies: ReplyTable,
}

/// VOICEVOX-compatible synthesis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicevoxConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Speaker id (8 = Tsumugi).
    pub speaker: u32,
    pub query_timeout_ms: u64,
    pub synthesis_timeout_ms: u64,
    /// Rate assumed for raw PCM responses.
    pub sample_rate: u32,
}

impl Default for VoicevoxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:50021".to_string(),
            speaker: 8,
            query_timeout_ms: 10_000,
            synthesis_timeout_ms: 20_000,
            sample_rate: 24_000,
        }
    }
}

impl VoicevoxConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}

/// Microphone listening window and the transcription API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// OpenAI-compatible base URL (e.g. https://api.openai.com/v1).
    pub api_url: String,
    /// Bearer key; optional for local endpoints.
    pub api_key: Option<String>,
    pub model: String,
    /// Locale passed to the transcription API.
    pub language: String,
    pub request_timeout_ms: u64,
    /// Capture rate; must be one WebRTC VAD accepts (8k/16k/32k/48k).
    pub sample_rate: u32,
    /// WebRTC VAD aggressiveness 0-3.
    pub vad_mode: u8,
    /// Ambient noise calibration before listening.
    pub ambient_adjust_ms: u64,
    /// Give up when no speech starts within this window.
    pub listen_timeout_ms: u64,
    /// Hard cap on one phrase.
    pub phrase_limit_ms: u64,
    /// Silence that closes a phrase.
    pub pause_ms: u64,
    /// Phrases shorter than this count as noise.
    pub min_phrase_ms: u64,
    /// Speech gate = max(ambient RMS * ratio, floor).
    pub energy_ratio: f32,
    pub energy_floor: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            language: "ja".to_string(),
            request_timeout_ms: 30_000,
            sample_rate: 16_000,
            vad_mode: 2,
            ambient_adjust_ms: 1_000,
            listen_timeout_ms: 3_000,
            phrase_limit_ms: 3_000,
            pause_ms: 800,
            min_phrase_ms: 200,
            energy_ratio: 1.5,
            energy_floor: 0.01,
        }
    }
}

/// Window geometries used by resize commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub default: Geometry,
    pub larger: Geometry,
    pub smaller: Geometry,
    /// Delay before a resized window snaps back to `default`.
    pub reset_delay_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default: Geometry::new(950, 1080),
            larger: Geometry::new(700, 600),
            smaller: Geometry::new(500, 400),
            reset_delay_ms: 2_000,
        }
    }
}

impl WindowConfig {
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

/// How the avatar looks while speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakingMode {
    /// Loop `speaking_clip` (animated GIF or a folder of frames).
    Clip,
    /// Swap to `speaking_image`.
    Still,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub idle_image: PathBuf,
    pub speaking_mode: SpeakingMode,
    pub speaking_clip: PathBuf,
    pub speaking_image: PathBuf,
    /// Share of the window width given to the avatar.
    pub width_fraction: f32,
    /// Share of the window height given to the avatar.
    pub height_fraction: f32,
    /// Frame delay when the clip reports no usable rate.
    pub fallback_frame_delay_ms: u64,
    /// Rate for frame folders, which carry no timing of their own.
    pub sequence_fps: f64,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            idle_image: PathBuf::from("vroid_character.png"),
            speaking_mode: SpeakingMode::Clip,
            speaking_clip: PathBuf::from("speaking.gif"),
            speaking_image: PathBuf::from("vroid_speaking.png"),
            width_fraction: 0.4,
            height_fraction: 0.3,
            fallback_frame_delay_ms: 30,
            sequence_fps: 30.0,
        }
    }
}

impl AvatarConfig {
    pub fn fallback_frame_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_frame_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    pub folder: PathBuf,
    pub interval_ms: u64,
    /// Lower-case extensions without the dot.
    pub extensions: Vec<String>,
    /// Create the folder with generated slides when it does not exist.
    pub seed_placeholders: bool,
    pub width_fraction: f32,
    pub height_fraction: f32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("img"),
            interval_ms: 3_000,
            extensions: ["png", "jpg", "jpeg", "gif", "bmp", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            seed_placeholders: true,
            width_fraction: 0.7,
            height_fraction: 0.4,
            min_width: 600,
            min_height: 400,
        }
    }
}

impl PresentationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Pause between the end of one reply and the next listen.
    pub inter_turn_pause_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            inter_turn_pause_ms: 100,
        }
    }
}

impl TurnConfig {
    pub fn inter_turn_pause(&self) -> Duration {
        Duration::from_millis(self.inter_turn_pause_ms)
    }
}

impl AgentConfig {
    /// Load from `HANASHI_CONFIG` (or the default path) and the environment.
    pub fn load() -> AgentResult<Self> {
        let path = std::env::var("HANASHI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load with an explicit file path. A missing file falls back to defaults.
    pub fn load_from(path: &Path) -> AgentResult<Self> {
        let defaults = config::Config::try_from(&AgentConfig::default())?;
        let builder = config::Config::builder().add_source(defaults);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("HANASHI").separator("__"))
            .build()?;

        let mut loaded: AgentConfig = built.try_deserialize()?;
        loaded.recognition.api_key = loaded
            .recognition
            .api_key
            .take()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_opt_string("HANASHI_STT_API_KEY"))
            .or_else(|| env_opt_string("STT_API_KEY"));
        Ok(loaded)
    }

    /// Write the defaults as TOML so users have something to edit.
    pub fn write_template(path: &Path) -> AgentResult<()> {
        let content = toml::to_string_pretty(&AgentConfig::default())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a configured media path against `assets_dir`.
    pub fn asset_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.assets_dir.join(path)
        }
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_desk_layout() {
        let c = AgentConfig::default();
        assert_eq!(c.voicevox.speaker, 8);
        assert_eq!(c.voicevox.synthesis_timeout(), Duration::from_secs(20));
        assert_eq!(c.window.default, Geometry::new(950, 1080));
        assert_eq!(c.window.reset_delay(), Duration::from_millis(2000));
        assert_eq!(c.presentation.interval(), Duration::from_millis(3000));
        assert_eq!(c.recognition.listen_timeout_ms, 3000);
        assert_eq!(c.avatar.fallback_frame_delay(), Duration::from_millis(30));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = AgentConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(c.voicevox.base_url, "http://127.0.0.1:50021");
        assert_eq!(c.presentation.extensions.len(), 6);
        assert!(!c.triggers.farewell.is_empty());
    }

    #[test]
    fn file_overrides_single_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hanashi.toml");
        fs::write(
            &path,
            "[voicevox]\nspeaker = 3\n\n[avatar]\nspeaking_mode = \"still\"\n",
        )
        .unwrap();

        let c = AgentConfig::load_from(&path).unwrap();
        assert_eq!(c.voicevox.speaker, 3);
        assert_eq!(c.voicevox.query_timeout_ms, 10_000);
        assert_eq!(c.avatar.speaking_mode, SpeakingMode::Still);
    }

    #[test]
    fn template_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hanashi.toml");
        AgentConfig::write_template(&path).unwrap();
        let c = AgentConfig::load_from(&path).unwrap();
        assert_eq!(c.window.larger, Geometry::new(700, 600));
        assert_eq!(c.replies.rules.len(), AgentConfig::default().replies.rules.len());
    }

    #[test]
    fn asset_paths_resolve_against_assets_dir() {
        let c = AgentConfig {
            assets_dir: PathBuf::from("/opt/hanashi"),
            ..Default::default()
        };
        assert_eq!(
            c.asset_path(Path::new("img")),
            PathBuf::from("/opt/hanashi/img")
        );
        assert_eq!(c.asset_path(Path::new("/abs.png")), PathBuf::from("/abs.png"));
    }
}
