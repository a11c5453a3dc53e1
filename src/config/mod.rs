//! Configuration management for VisionPal
//!
//! Precedence: environment > TOML file > built-in default. Both the config
//! and the credential file are bootstrapped with defaults on first run.

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

pub use file::ConfigPaths;
use file::{
    CameraFileConfig, CredentialsFile, PromptsFileConfig, TimingFileConfig, VisionFileConfig,
    VisionPalConfigFile, VoiceFileConfig,
};

use crate::profile::{DEFAULT_PROMPT_AR, DEFAULT_PROMPT_EN, LanguageProfiles};
use crate::{Error, Result};

/// Placeholder written to a fresh credential file
pub const PLACEHOLDER_API_KEY: &str = "YOUR_TOGETHER_API_KEY_HERE";

/// Environment variable that overrides the credential file
pub const API_KEY_ENV: &str = "TOGETHER_API_KEY";

pub(crate) const DEFAULT_MODEL: &str = "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo";
const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";
const DEFAULT_DESCRIBE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STT_MODEL: &str = "openai/whisper-large-v3";
const DEFAULT_TTS_MODEL: &str = "cartesia/sonic";
const DEFAULT_TTS_VOICE: &str = "helpful woman";
const DEFAULT_LISTEN_TIMEOUT_SECS: f64 = 1.0;
const DEFAULT_PHRASE_LIMIT_SECS: f64 = 5.0;
const DEFAULT_CALIBRATION_MS: u64 = 500;
const DEFAULT_VOICE_REQUEST_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_RESET_DELAY_MS: u64 = 2000;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 30;

/// VisionPal configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the files were read from
    pub paths: ConfigPaths,

    /// Vision description service
    pub vision: VisionConfig,

    /// Speech recognition and synthesis
    pub voice: VoiceConfig,

    /// Controller delays and polling
    pub timing: TimingConfig,

    /// Camera device
    pub camera: CameraConfig,

    /// Per-language prompts and locales
    pub profiles: LanguageProfiles,

    api_key: Option<SecretString>,
}

/// Vision description service configuration
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub model: String,
    pub base_url: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub base_url: String,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub listen_timeout: Duration,
    pub phrase_limit: Duration,
    pub calibration: Duration,
    /// Limit for one STT or TTS request
    pub request_timeout: Duration,
}

/// Controller timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Delay after a description is spoken before returning to idle
    pub reset_delay: Duration,

    /// Camera preview polling interval
    pub frame_interval: Duration,

    /// Client-side deadline for one description request
    pub describe_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reset_delay: Duration::from_millis(DEFAULT_RESET_DELAY_MS),
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
            describe_timeout: Duration::from_secs(DEFAULT_DESCRIBE_TIMEOUT_SECS),
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone, Default)]
pub struct CameraConfig {
    pub device_index: u32,
    pub input_format: Option<String>,
    pub device: Option<String>,
    pub ffmpeg: Option<String>,
}

impl Config {
    /// Load configuration, bootstrapping missing files first
    ///
    /// Uses the platform config directory unless `config_file` is given.
    ///
    /// # Errors
    ///
    /// Returns error if the bootstrap files cannot be written
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let paths = config_file.map_or_else(ConfigPaths::default_location, |p| {
            ConfigPaths::for_config_file(p)
        });

        bootstrap(&paths)?;

        let fc = file::load_config_file(&paths.config_file);
        let credentials = file::load_credentials_file(&paths.credentials_file);
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .or(credentials.together_api_key);

        let mut config = Self::from_file(paths, fc, api_key);

        if let Ok(model) = std::env::var("VISIONPAL_MODEL") {
            config.vision.model = model;
        }
        if let Ok(base_url) = std::env::var("VISIONPAL_BASE_URL") {
            config.vision.base_url = base_url;
        }

        Ok(config)
    }

    /// Build configuration from an already-parsed file
    #[must_use]
    pub fn from_file(paths: ConfigPaths, fc: VisionPalConfigFile, api_key: Option<String>) -> Self {
        let vision_base_url = fc
            .vision
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let vision = VisionConfig {
            model: fc.vision.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: vision_base_url.clone(),
            max_tokens: fc.vision.max_tokens,
            temperature: fc.vision.temperature,
            timeout: Duration::from_secs(
                fc.vision
                    .timeout_secs
                    .unwrap_or(DEFAULT_DESCRIBE_TIMEOUT_SECS),
            ),
        };

        let voice = VoiceConfig {
            base_url: fc.voice.base_url.unwrap_or(vision_base_url),
            stt_model: fc
                .voice
                .stt_model
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            tts_model: fc
                .voice
                .tts_model
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            tts_voice: fc
                .voice
                .tts_voice
                .unwrap_or_else(|| DEFAULT_TTS_VOICE.to_string()),
            listen_timeout: secs_or(fc.voice.listen_timeout_secs, DEFAULT_LISTEN_TIMEOUT_SECS),
            phrase_limit: secs_or(fc.voice.phrase_limit_secs, DEFAULT_PHRASE_LIMIT_SECS),
            calibration: Duration::from_millis(
                fc.voice.calibration_ms.unwrap_or(DEFAULT_CALIBRATION_MS),
            ),
            request_timeout: secs_or(
                fc.voice.request_timeout_secs,
                DEFAULT_VOICE_REQUEST_TIMEOUT_SECS,
            ),
        };

        let timing = TimingConfig {
            reset_delay: Duration::from_millis(
                fc.timing.reset_delay_ms.unwrap_or(DEFAULT_RESET_DELAY_MS),
            ),
            frame_interval: Duration::from_millis(
                fc.timing
                    .frame_interval_ms
                    .unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
            ),
            describe_timeout: vision.timeout,
        };

        let camera = CameraConfig {
            device_index: fc.camera.device_index.unwrap_or(0),
            input_format: fc.camera.input_format,
            device: fc.camera.device,
            ffmpeg: fc.camera.ffmpeg,
        };

        let profiles = LanguageProfiles::new(fc.prompts.en, fc.prompts.ar);

        Self {
            paths,
            vision,
            voice,
            timing,
            camera,
            profiles,
            api_key: api_key.map(SecretString::from),
        }
    }

    /// The API credential, refusing absent or placeholder values
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the file and variable to set
    pub fn api_key(&self) -> Result<SecretString> {
        match &self.api_key {
            Some(key) if is_usable_key(key.expose_secret()) => Ok(key.clone()),
            _ => Err(Error::Config(format!(
                "{API_KEY_ENV} not found or not set. Add your key to {} or export {API_KEY_ENV}, then restart",
                self.paths.credentials_file.display()
            ))),
        }
    }
}

/// Whether a credential is present and not the bootstrap placeholder
#[must_use]
pub fn is_usable_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != PLACEHOLDER_API_KEY
}

/// Positive seconds as a duration; anything unrepresentable gets `default`
fn secs_or(value: Option<f64>, default: f64) -> Duration {
    value
        .and_then(|v| Duration::try_from_secs_f64(v).ok())
        .filter(|d| !d.is_zero())
        .unwrap_or_else(|| Duration::from_secs_f64(default))
}

/// Write default config and placeholder credential files if absent
///
/// Returns true if anything was created.
///
/// # Errors
///
/// Returns error if a file cannot be written
pub fn bootstrap(paths: &ConfigPaths) -> Result<bool> {
    let mut created = false;

    if !paths.config_file.exists() {
        file::write_toml(&paths.config_file, &default_config_file())?;
        tracing::info!(path = %paths.config_file.display(), "created default config file");
        created = true;
    }

    if !paths.credentials_file.exists() {
        let credentials = CredentialsFile {
            together_api_key: Some(PLACEHOLDER_API_KEY.to_string()),
        };
        file::write_toml(&paths.credentials_file, &credentials)?;
        tracing::warn!(
            path = %paths.credentials_file.display(),
            "created credentials file, add your {API_KEY_ENV} to it"
        );
        created = true;
    }

    Ok(created)
}

/// Config file with every default spelled out
#[must_use]
pub fn default_config_file() -> VisionPalConfigFile {
    VisionPalConfigFile {
        vision: VisionFileConfig {
            model: Some(DEFAULT_MODEL.to_string()),
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            max_tokens: None,
            temperature: None,
            timeout_secs: Some(DEFAULT_DESCRIBE_TIMEOUT_SECS),
        },
        prompts: PromptsFileConfig {
            en: Some(DEFAULT_PROMPT_EN.to_string()),
            ar: Some(DEFAULT_PROMPT_AR.to_string()),
        },
        voice: VoiceFileConfig {
            base_url: None,
            stt_model: Some(DEFAULT_STT_MODEL.to_string()),
            tts_model: Some(DEFAULT_TTS_MODEL.to_string()),
            tts_voice: Some(DEFAULT_TTS_VOICE.to_string()),
            listen_timeout_secs: Some(DEFAULT_LISTEN_TIMEOUT_SECS),
            phrase_limit_secs: Some(DEFAULT_PHRASE_LIMIT_SECS),
            calibration_ms: Some(DEFAULT_CALIBRATION_MS),
            request_timeout_secs: Some(DEFAULT_VOICE_REQUEST_TIMEOUT_SECS),
        },
        timing: TimingFileConfig {
            reset_delay_ms: Some(DEFAULT_RESET_DELAY_MS),
            frame_interval_ms: Some(DEFAULT_FRAME_INTERVAL_MS),
        },
        camera: CameraFileConfig {
            device_index: Some(0),
            input_format: None,
            device: None,
            ffmpeg: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Language;

    fn paths(dir: &Path) -> ConfigPaths {
        ConfigPaths::in_dir(dir)
    }

    #[test]
    fn bootstrap_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir.path().join("Configs"));

        assert!(bootstrap(&paths).unwrap());
        assert!(paths.config_file.exists());
        assert!(paths.credentials_file.exists());
        assert!(!bootstrap(&paths).unwrap());

        let credentials = file::load_credentials_file(&paths.credentials_file);
        assert_eq!(
            credentials.together_api_key.as_deref(),
            Some(PLACEHOLDER_API_KEY)
        );

        let fc = file::load_config_file(&paths.config_file);
        assert_eq!(fc.vision.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(fc.timing.reset_delay_ms, Some(DEFAULT_RESET_DELAY_MS));
    }

    #[test]
    fn placeholder_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(
            paths(dir.path()),
            VisionPalConfigFile::default(),
            Some(PLACEHOLDER_API_KEY.to_string()),
        );

        let err = config.api_key().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn missing_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(paths(dir.path()), VisionPalConfigFile::default(), None);
        assert!(matches!(config.api_key(), Err(Error::Config(_))));
    }

    #[test]
    fn real_key_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(
            paths(dir.path()),
            VisionPalConfigFile::default(),
            Some("tg-123".to_string()),
        );
        assert_eq!(config.api_key().unwrap().expose_secret(), "tg-123");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc: VisionPalConfigFile = toml::from_str(
            r#"
            [vision]
            base_url = "http://localhost:8080/v1"
            timeout_secs = 5

            [prompts]
            ar = "صف الصورة"

            [timing]
            reset_delay_ms = 10
            "#,
        )
        .unwrap();

        let config = Config::from_file(paths(dir.path()), fc, None);
        assert_eq!(config.vision.base_url, "http://localhost:8080/v1");
        assert_eq!(config.voice.base_url, "http://localhost:8080/v1");
        assert_eq!(config.timing.describe_timeout, Duration::from_secs(5));
        assert_eq!(config.timing.reset_delay, Duration::from_millis(10));
        assert_eq!(config.timing.frame_interval, Duration::from_millis(30));
        assert_eq!(
            config.profiles.get(Language::Arabic).default_prompt,
            "صف الصورة"
        );
        assert_eq!(config.voice.listen_timeout, Duration::from_secs(1));
        assert_eq!(config.voice.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn unrepresentable_durations_fall_back_to_defaults() {
        assert_eq!(secs_or(Some(1e300), 1.0), Duration::from_secs(1));
        assert_eq!(secs_or(Some(f64::INFINITY), 1.0), Duration::from_secs(1));
        assert_eq!(secs_or(Some(f64::NAN), 1.0), Duration::from_secs(1));
        assert_eq!(secs_or(Some(-2.0), 1.0), Duration::from_secs(1));
        assert_eq!(secs_or(Some(0.0), 1.0), Duration::from_secs(1));
        assert_eq!(secs_or(Some(2.5), 1.0), Duration::from_millis(2500));
    }

    #[test]
    fn huge_listen_timeout_in_file_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let fc: VisionPalConfigFile = toml::from_str(
            r#"
            [voice]
            listen_timeout_secs = 1e300
            request_timeout_secs = 4.0
            "#,
        )
        .unwrap();

        let config = Config::from_file(paths(dir.path()), fc, None);
        assert_eq!(config.voice.listen_timeout, Duration::from_secs(1));
        assert_eq!(config.voice.request_timeout, Duration::from_secs(4));
    }
}
