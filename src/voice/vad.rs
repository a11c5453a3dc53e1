//! Energy-based speech segmentation
//!
//! Splits microphone audio into one phrase: waits for energy above a
//! threshold calibrated against ambient noise, then accumulates until a
//! pause of trailing silence.

use super::capture::SAMPLE_RATE;

/// Lowest threshold a calibration may produce
pub const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Threshold used before calibration
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Threshold as a multiple of the ambient noise level
const AMBIENT_RATIO: f32 = 1.5;

/// Minimum duration of speech for a phrase, in tenths of a second
const MIN_SPEECH_TENTHS: usize = 3;

/// Pause that ends a phrase, in tenths of a second
const PAUSE_TENTHS: usize = 8;

/// Progress of the current phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// No speech yet
    Waiting,
    /// Speech started, accumulating
    Speaking,
    /// Speech followed by a pause
    Complete,
}

/// Segments one spoken phrase out of an audio stream
#[derive(Debug)]
pub struct SpeechSegmenter {
    threshold: f32,
    state: SegmentState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    min_speech_samples: usize,
    pause_samples: usize,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSegmenter {
    /// Segmenter for audio at [`SAMPLE_RATE`]
    #[must_use]
    pub const fn new() -> Self {
        Self::with_sample_rate(SAMPLE_RATE)
    }

    /// Segmenter for audio at `sample_rate`
    #[must_use]
    pub const fn with_sample_rate(sample_rate: u32) -> Self {
        let per_tenth = sample_rate as usize / 10;
        Self {
            threshold: DEFAULT_ENERGY_THRESHOLD,
            state: SegmentState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            min_speech_samples: per_tenth * MIN_SPEECH_TENTHS,
            pause_samples: per_tenth * PAUSE_TENTHS,
        }
    }

    /// Set the energy threshold from a window of ambient noise
    ///
    /// Returns the new threshold.
    pub fn calibrate(&mut self, ambient: &[f32]) -> f32 {
        let ambient_energy = calculate_energy(ambient);
        self.threshold = (ambient_energy * AMBIENT_RATIO).max(MIN_ENERGY_THRESHOLD);
        tracing::debug!(ambient_energy, threshold = self.threshold, "calibrated for ambient noise");
        self.threshold
    }

    /// Feed samples and report progress
    pub fn process(&mut self, samples: &[f32]) -> SegmentState {
        if samples.is_empty() {
            return self.state;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            SegmentState::Waiting => {
                if is_speech {
                    self.state = SegmentState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            SegmentState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > self.pause_samples
                    && self.speech_buffer.len() > self.min_speech_samples + self.silence_counter
                {
                    tracing::trace!(samples = self.speech_buffer.len(), "phrase complete");
                    self.state = SegmentState::Complete;
                } else if self.silence_counter > self.pause_samples {
                    // too short to be a phrase
                    tracing::trace!("noise burst discarded");
                    self.reset();
                }
            }
            SegmentState::Complete => {}
        }

        self.state
    }

    /// Take the accumulated phrase and start over
    pub fn take_speech(&mut self) -> Vec<f32> {
        let speech = std::mem::take(&mut self.speech_buffer);
        self.reset();
        speech
    }

    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Back to waiting, keeping the calibrated threshold
    pub fn reset(&mut self) {
        self.state = SegmentState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
