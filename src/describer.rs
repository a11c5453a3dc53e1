//! Vision description client
//!
//! Sends an image and prompt to an OpenAI-compatible chat completions
//! endpoint and concatenates the streamed text chunks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::VisionConfig;
use crate::phrases::FALLBACK_DESCRIPTION;
use crate::profile::LanguageProfile;
use crate::session::ImageHandle;
use crate::{Error, Result};

/// Something that can describe an image
#[async_trait]
pub trait Describe: Send + Sync {
    /// Describe the image at `image` following `prompt`
    ///
    /// An empty string means the service answered without content.
    ///
    /// # Errors
    ///
    /// Returns `Error::Service` if the request fails before any text arrived
    async fn describe(&self, image: &Path, prompt: &str) -> Result<String>;
}

/// An image paired with the prompt to describe it with
#[derive(Debug, Clone)]
pub struct DescriptionRequest {
    pub image: ImageHandle,
    pub prompt: String,
}

impl DescriptionRequest {
    /// Pair an image with a prompt, falling back to the profile's default prompt
    #[must_use]
    pub fn new(image: ImageHandle, prompt: Option<&str>, profile: &LanguageProfile) -> Self {
        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(profile.default_prompt.as_str())
            .to_string();
        Self { image, prompt }
    }
}

/// Text returned for a description request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionResult {
    pub text: String,
    pub prompt: String,
    pub image: PathBuf,
}

impl DescriptionResult {
    /// Wrap service output, substituting the fallback for empty text
    #[must_use]
    pub fn new(text: String, prompt: String, image: PathBuf) -> Self {
        let text = if text.trim().is_empty() {
            FALLBACK_DESCRIPTION.to_string()
        } else {
            text.trim().to_string()
        };
        Self {
            text,
            prompt,
            image,
        }
    }
}

/// Run a request against a describer and apply the fallback policy
///
/// # Errors
///
/// Returns the describer's error
pub async fn run_request(
    describer: &dyn Describe,
    request: &DescriptionRequest,
) -> Result<DescriptionResult> {
    let path = request.image.path();
    let text = describer.describe(path, &request.prompt).await?;
    Ok(DescriptionResult::new(
        text,
        request.prompt.clone(),
        path.to_path_buf(),
    ))
}

/// Run a request, giving up once twice `timeout` has passed
///
/// [`DescriberClient`] enforces `timeout` itself and returns any partial
/// text when it expires. The outer limit only catches describers that
/// never answer.
///
/// # Errors
///
/// Returns the describer's error, or `Error::Service` when the outer limit hits
pub async fn run_request_within(
    describer: &dyn Describe,
    request: &DescriptionRequest,
    timeout: Duration,
) -> Result<DescriptionResult> {
    let limit = timeout.saturating_mul(2);
    tokio::time::timeout(limit, run_request(describer, request))
        .await
        .unwrap_or_else(|_| {
            Err(Error::Service(format!(
                "request timed out after {}s",
                limit.as_secs_f64()
            )))
        })
}

/// HTTP client for the hosted vision model
pub struct DescriberClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout: Duration,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

/// Content block (text or image)
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock<'a> {
    #[serde(rename = "text")]
    Text { text: &'a str },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// One streamed completion chunk
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

impl DescriberClient {
    /// Create a new describer client
    ///
    /// `config.timeout` bounds each [`Describe::describe`] call from start to
    /// last chunk.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &VisionConfig, api_key: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: config.timeout,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn build_request<'a>(&'a self, prompt: &'a str, data_url: String) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Text { text: prompt },
                    ContentBlock::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            stream: true,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl Describe for DescriberClient {
    async fn describe(&self, image: &Path, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::Service("prompt must not be empty".to_string()));
        }

        let deadline = Instant::now() + self.timeout;
        let data_url = encode_image(image).await?;
        let request = self.build_request(prompt, data_url);

        tracing::debug!(model = %self.model, image = %image.display(), "requesting description");

        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send();
        let response = tokio::time::timeout_at(deadline, send)
            .await
            .map_err(|_| {
                Error::Service(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| Error::Service(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = tokio::time::timeout_at(deadline, response.text())
                .await
                .ok()
                .and_then(std::result::Result::ok)
                .unwrap_or_default();
            tracing::error!(status = %status, body = %body, "vision API error");
            return Err(Error::Service(format!("API error {status}: {body}")));
        }

        let description = collect_stream(response.bytes_stream(), deadline).await?;
        tracing::debug!(chars = description.len(), "image described");
        Ok(description)
    }
}

/// Read an image file and encode it as a base64 data URL
///
/// # Errors
///
/// Returns `Error::Service` if the file cannot be read
pub async fn encode_image(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::Service(format!("cannot read image {}: {e}", path.display())))?;
    if bytes.is_empty() {
        return Err(Error::Service(format!("image {} is empty", path.display())));
    }

    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{};base64,{data}", mime_type_for(path)))
}

/// MIME type from the file extension, jpeg when unknown
#[must_use]
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Concatenate streamed completion chunks until the stream ends or `deadline`
///
/// A transport error or the deadline after some text arrived returns that
/// text; with nothing received it fails. A stream that ends cleanly without
/// content yields an empty string.
///
/// # Errors
///
/// Returns `Error::Service` if the stream fails or stalls before producing text
pub async fn collect_stream<S, B, E>(stream: S, deadline: Instant) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::default();
    let mut description = String::new();

    loop {
        let Ok(next) = tokio::time::timeout_at(deadline, stream.next()).await else {
            if description.is_empty() {
                return Err(Error::Service(
                    "timed out waiting for the description".to_string(),
                ));
            }
            tracing::warn!(
                chars = description.len(),
                "deadline reached, keeping partial description"
            );
            return Ok(description);
        };
        let Some(item) = next else {
            break;
        };

        match item {
            Ok(bytes) => {
                for piece in decoder.push(bytes.as_ref()) {
                    description.push_str(&piece);
                }
                if decoder.is_done() {
                    break;
                }
            }
            Err(e) => {
                if description.is_empty() {
                    return Err(Error::Service(format!("stream failed: {e}")));
                }
                tracing::warn!(
                    error = %e,
                    chars = description.len(),
                    "stream interrupted, keeping partial description"
                );
                return Ok(description);
            }
        }
    }

    for piece in decoder.finish() {
        description.push_str(&piece);
    }

    Ok(description)
}

/// Incremental decoder for `data:` lines of a server-sent event stream
#[derive(Debug, Default)]
struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feed raw bytes, returning the text of every complete chunk
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut pieces = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(piece) = self.decode_line(&line) {
                pieces.push(piece);
            }
        }
        pieces
    }

    /// Flush a trailing line that had no newline
    fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.pending);
        self.decode_line(&line).into_iter().collect()
    }

    const fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<String> {
        if self.done {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let payload = line.trim().strip_prefix("data:")?.trim();

        if payload == "[DONE]" {
            self.done = true;
            return None;
        }

        match serde_json::from_str::<ChatChunk>(payload) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty()),
            Err(e) => {
                tracing::debug!(error = %e, payload, "skipping undecodable chunk");
                None
            }
        }
    }
}
