//! TOML configuration and credential files
//!
//! `config.toml` holds the model, prompts and timing; `credentials.toml`
//! holds the API key. All fields are optional and overlay the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level `config.toml` schema
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VisionPalConfigFile {
    /// Vision model and endpoint
    #[serde(default)]
    pub vision: VisionFileConfig,

    /// Default description prompt per language code
    #[serde(default)]
    pub prompts: PromptsFileConfig,

    /// Speech recognition and synthesis
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Delays and polling intervals
    #[serde(default)]
    pub timing: TimingFileConfig,

    /// Camera device selection
    #[serde(default)]
    pub camera: CameraFileConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VisionFileConfig {
    /// Model identifier (e.g. "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// OpenAI-compatible API base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Client-side deadline for one description request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PromptsFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ar: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VoiceFileConfig {
    /// Base URL for STT/TTS, defaults to the vision base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// STT model (e.g. "openai/whisper-large-v3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_model: Option<String>,

    /// TTS model (e.g. "cartesia/sonic")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_model: Option<String>,

    /// TTS voice identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_voice: Option<String>,

    /// How long one listen call waits for speech to start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_timeout_secs: Option<f64>,

    /// Maximum length of one utterance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase_limit_secs: Option<f64>,

    /// Ambient noise calibration window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_ms: Option<u64>,

    /// Limit for one transcription or synthesis request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TimingFileConfig {
    /// Delay between speaking a description and returning to idle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_delay_ms: Option<u64>,

    /// Camera preview polling interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CameraFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_index: Option<u32>,

    /// ffmpeg input format (v4l2, avfoundation, dshow)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,

    /// ffmpeg input device, overrides the index-derived default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Path to the ffmpeg binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<String>,
}

/// `credentials.toml` schema
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CredentialsFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub together_api_key: Option<String>,
}

/// Where the config and credential files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
    pub credentials_file: PathBuf,
}

impl ConfigPaths {
    /// Paths under the platform config directory (`~/.config/visionpal` on Linux)
    #[must_use]
    pub fn default_location() -> Self {
        let dir = directories::ProjectDirs::from("", "", "visionpal")
            .map_or_else(|| PathBuf::from("Configs"), |d| d.config_dir().to_path_buf());
        Self::in_dir(&dir)
    }

    /// Paths for an explicit config file; credentials sit beside it
    #[must_use]
    pub fn for_config_file(config_file: &Path) -> Self {
        let dir = config_file.parent().unwrap_or_else(|| Path::new("."));
        Self {
            config_file: config_file.to_path_buf(),
            credentials_file: dir.join("credentials.toml"),
        }
    }

    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config_file: dir.join("config.toml"),
            credentials_file: dir.join("credentials.toml"),
        }
    }
}

/// Load `config.toml`
///
/// Returns defaults if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file(path: &Path) -> VisionPalConfigFile {
    load_toml(path, "config file")
}

/// Load `credentials.toml`
///
/// Returns an empty credential set if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_credentials_file(path: &Path) -> CredentialsFile {
    load_toml(path, "credentials file")
}

fn load_toml<T>(path: &Path, what: &str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(parsed) => {
                tracing::info!(path = %path.display(), "loaded {what}");
                parsed
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse {what}, using defaults"
                );
                T::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read {what}"
            );
            T::default()
        }
    }
}

/// Write a TOML document, creating parent directories
///
/// # Errors
///
/// Returns error if serialization or the write fails
pub fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}
