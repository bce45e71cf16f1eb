//! Configuration types for the conversation core.

use crate::tts::ProviderKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NannaConfig {
    /// Turn and history settings.
    pub conversation: ConversationConfig,
    /// Speech capture settings.
    pub capture: CaptureConfig,
    /// Language model settings.
    pub llm: LlmConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Face animation settings.
    pub animation: AnimationConfig,
}

/// Turn and history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of completed exchanges kept as generation context.
    pub max_turns: usize,
    /// Speak replies automatically. When off, replies are only displayed.
    pub auto_speak: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            auto_speak: true,
        }
    }
}

/// Speech capture configuration, handed to the capture adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recognition language tag.
    pub lang: String,
    /// Emit partial transcripts while the user is speaking.
    pub interim_results: bool,
    /// Seconds to wait for a final transcript before giving up.
    pub timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            lang: "en-IN".to_owned(),
            interim_results: true,
            timeout_secs: 30,
        }
    }
}

impl CaptureConfig {
    /// Capture timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Which text-generation backend to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint.
    #[serde(alias = "openai-compatible")]
    OpenAi,
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which backend to call.
    pub provider: LlmProvider,
    /// Gemini settings.
    pub gemini: GeminiConfig,
    /// OpenAI-compatible settings.
    pub openai: OpenAiConfig,
    /// Maximum tokens to generate per reply.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Hard timeout for one generation call.
    pub timeout_secs: u64,
    /// Persona prompt sent with every request.
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            gemini: GeminiConfig::default(),
            openai: OpenAiConfig::default(),
            max_tokens: 256,
            temperature: 0.8,
            timeout_secs: 30,
            system_prompt: crate::llm::DEFAULT_SYSTEM_PROMPT.to_owned(),
        }
    }
}

impl LlmConfig {
    /// Generation timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Gemini connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key (empty = not configured).
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// API base URL.
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash".to_owned(),
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
        }
    }
}

/// OpenAI-compatible connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key (empty = not configured).
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Base URL including `/v1`.
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
            base_url: "https://api.openai.com/v1".to_owned(),
        }
    }
}

/// Text-to-speech configuration: the active provider plus every provider's settings.
///
/// The chain receives a fresh snapshot of this struct on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Active provider. `system` is the terminal fallback.
    pub provider: ProviderKind,
    /// Local system voice.
    pub system: SystemVoiceConfig,
    /// ElevenLabs (cloned voice, immediate audio).
    pub elevenlabs: ElevenLabsConfig,
    /// Resemble (cloned voice, asynchronous clip jobs).
    pub resemble: ResembleConfig,
    /// Self-hosted Coqui server.
    pub coqui: CoquiConfig,
    /// Interval between pending-job polls.
    pub poll_interval_ms: u64,
    /// Maximum number of polls before a pending job is a failure.
    pub max_poll_attempts: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::System,
            system: SystemVoiceConfig::default(),
            elevenlabs: ElevenLabsConfig::default(),
            resemble: ResembleConfig::default(),
            coqui: CoquiConfig::default(),
            poll_interval_ms: 500,
            max_poll_attempts: 30,
        }
    }
}

/// System voice parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemVoiceConfig {
    /// Voice language tag.
    pub lang: String,
    /// Speaking rate (1.0 = normal).
    pub rate: f32,
    /// Pitch (1.0 = normal).
    pub pitch: f32,
    /// Volume in `0.0..=1.0`.
    pub volume: f32,
}

impl Default for SystemVoiceConfig {
    fn default() -> Self {
        Self {
            lang: "en-IN".to_owned(),
            rate: 0.9,
            pitch: 0.85,
            volume: 1.0,
        }
    }
}

/// ElevenLabs settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    /// API key (empty = not configured).
    pub api_key: String,
    /// Cloned voice ID.
    pub voice_id: String,
    /// Synthesis model.
    pub model_id: String,
    /// Voice stability.
    pub stability: f32,
    /// Similarity boost.
    pub similarity_boost: f32,
    /// API base URL.
    pub base_url: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: String::new(),
            model_id: "eleven_multilingual_v2".to_owned(),
            stability: 0.5,
            similarity_boost: 0.75,
            base_url: "https://api.elevenlabs.io".to_owned(),
        }
    }
}

/// Resemble settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResembleConfig {
    /// API token (empty = not configured).
    pub api_key: String,
    /// Project the clips are created in.
    pub project_uuid: String,
    /// Cloned voice.
    pub voice_uuid: String,
    /// API base URL.
    pub base_url: String,
}

impl Default for ResembleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_uuid: String::new(),
            voice_uuid: String::new(),
            base_url: "https://app.resemble.ai".to_owned(),
        }
    }
}

/// Coqui TTS server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoquiConfig {
    /// Server base URL.
    pub server_url: String,
    /// Speaker name known to the server.
    pub speaker_id: String,
    /// Synthesis language.
    pub language: String,
}

impl Default for CoquiConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5002".to_owned(),
            speaker_id: "nanna".to_owned(),
            // Hindi is the closest supported language to Telugu.
            language: "hi".to_owned(),
        }
    }
}

/// Which animation strategy drives the face while speaking.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationMode {
    /// Estimated timing from the reply text.
    #[default]
    Text,
    /// Measured timing from playback amplitude.
    Amplitude,
}

/// Face animation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Strategy used while speaking.
    pub mode: AnimationMode,
    /// Shortest time a text-timed frame is shown.
    pub min_frame_ms: u64,
    /// Estimated speaking time per character.
    pub ms_per_char: u64,
    /// Chance that a text-timed frame shows the detected emotion instead.
    pub emotion_override_probability: f64,
    /// How long a smile is held after speech before settling to neutral.
    pub smile_hold_ms: u64,
    /// Amplitude sampling cadence.
    pub sample_interval_ms: u64,
    /// Upper bounds of the silence, low, medium and high amplitude buckets.
    /// Levels at or above the last bound are very high.
    pub amplitude_thresholds: [f32; 4],
    /// Seed for expression overrides (None = seeded from entropy).
    pub rng_seed: Option<u64>,
    /// Directory holding expression images (None = no asset checks).
    pub assets_dir: Option<PathBuf>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            mode: AnimationMode::Text,
            min_frame_ms: 80,
            ms_per_char: 90,
            emotion_override_probability: 0.15,
            smile_hold_ms: 2000,
            sample_interval_ms: 50,
            amplitude_thresholds: [0.04, 0.16, 0.31, 0.47],
            rng_seed: None,
            assets_dir: None,
        }
    }
}

impl AnimationConfig {
    /// Minimum frame duration.
    pub fn min_frame(&self) -> Duration {
        Duration::from_millis(self.min_frame_ms.max(1))
    }

    /// Amplitude sampling cadence.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    /// Smile hold after speech.
    pub fn smile_hold(&self) -> Duration {
        Duration::from_millis(self.smile_hold_ms)
    }
}

impl NannaConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::NannaError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::NannaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/nanna/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("nanna")
            .join("config.toml")
    }
}
