//! One-shot speech recognition from the microphone

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::capture::{AudioCapture, SAMPLE_RATE, resample_for_speech, samples_to_wav};
use super::stt::SpeechToText;
use super::vad::{SegmentState, SpeechSegmenter};
use crate::error::RecognitionError;

/// How often the recording loop drains the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Listens for one utterance and returns its transcript
#[async_trait]
pub trait Listener: Send + Sync {
    /// Wait up to `timeout` for speech to begin, then transcribe it
    ///
    /// `locale` selects the recognizer language, e.g. "en-US" or "ar-SA".
    async fn listen(&self, timeout: Duration, locale: &str) -> Result<String, RecognitionError>;
}

/// Listener backed by the default microphone and a remote STT model
pub struct MicListener {
    stt: SpeechToText,
    phrase_limit: Duration,
    calibration: Duration,
}

impl MicListener {
    #[must_use]
    pub const fn new(stt: SpeechToText, phrase_limit: Duration, calibration: Duration) -> Self {
        Self {
            stt,
            phrase_limit,
            calibration,
        }
    }
}

#[async_trait]
impl Listener for MicListener {
    async fn listen(&self, timeout: Duration, locale: &str) -> Result<String, RecognitionError> {
        let phrase_limit = self.phrase_limit;
        let calibration = self.calibration;

        let (speech, sample_rate) = tokio::task::spawn_blocking(move || {
            record_phrase(timeout, phrase_limit, calibration)
        })
        .await
        .map_err(|e| RecognitionError::ServiceUnavailable(format!("recording task failed: {e}")))??;

        let wav = resample_for_speech(&speech, sample_rate)
            .and_then(|speech| samples_to_wav(&speech, SAMPLE_RATE))
            .map_err(|e| RecognitionError::ServiceUnavailable(e.to_string()))?;

        let transcript = self
            .stt
            .transcribe(&wav, locale)
            .await
            .map_err(|e| RecognitionError::ServiceUnavailable(e.to_string()))?;

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(RecognitionError::Unintelligible);
        }

        tracing::debug!(transcript, locale, "utterance recognized");
        Ok(transcript.to_string())
    }
}

/// Record a single phrase on the current thread
///
/// Calibrates against ambient noise first, waits up to `timeout` for speech
/// to start, then records until a pause or `phrase_limit`. Returns the
/// phrase at the microphone's native rate, with that rate.
fn record_phrase(
    timeout: Duration,
    phrase_limit: Duration,
    calibration: Duration,
) -> Result<(Vec<f32>, u32), RecognitionError> {
    let mut capture =
        AudioCapture::new().map_err(|e| RecognitionError::ServiceUnavailable(e.to_string()))?;
    capture
        .start()
        .map_err(|e| RecognitionError::ServiceUnavailable(e.to_string()))?;

    let sample_rate = capture.sample_rate();
    let mut segmenter = SpeechSegmenter::with_sample_rate(sample_rate);
    if !calibration.is_zero() {
        std::thread::sleep(calibration);
        segmenter.calibrate(&capture.take_buffer());
    }

    let started = Instant::now();
    let mut speech_started_at: Option<Instant> = None;

    loop {
        std::thread::sleep(POLL_INTERVAL);
        let samples = capture.take_buffer();
        let state = segmenter.process(&samples);

        match state {
            SegmentState::Complete => break,
            SegmentState::Speaking => {
                let since = *speech_started_at.get_or_insert_with(Instant::now);
                if since.elapsed() >= phrase_limit {
                    tracing::trace!("phrase limit reached");
                    break;
                }
            }
            SegmentState::Waiting => {
                // a discarded noise burst does not restart the wait
                speech_started_at = None;
                if started.elapsed() >= timeout {
                    return Err(RecognitionError::Timeout);
                }
            }
        }
    }

    capture.stop();
    let speech = segmenter.take_speech();
    if speech.is_empty() {
        return Err(RecognitionError::Unintelligible);
    }
    Ok((speech, sample_rate))
}
