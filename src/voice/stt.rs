//! Speech-to-text (STT) processing

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes speech to text with a Whisper-style endpoint
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl SpeechToText {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &VoiceConfig, api_key: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.stt_model.clone(),
        })
    }

    /// Transcribe WAV audio
    ///
    /// `locale` is a tag such as "ar-SA"; its language subtag is sent as a hint.
    ///
    /// # Errors
    ///
    /// Returns error if the request or the API fails
    pub async fn transcribe(&self, audio: &[u8], locale: &str) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), locale, "starting transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Audio(e.to_string()))?,
            )
            .text("model", self.model.clone());

        if let Some(language) = language_subtag(locale) {
            form = form.text("language", language);
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, timeout = e.is_timeout(), "transcription request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Audio(format!("transcription API error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await?;

        tracing::debug!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

/// Primary language subtag of a locale ("ar-SA" → "ar")
#[must_use]
pub fn language_subtag(locale: &str) -> Option<String> {
    locale
        .split(['-', '_'])
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}
