//! Voice input and output
//!
//! Microphone capture is segmented into phrases and transcribed remotely;
//! spoken feedback is synthesized remotely and played on the default
//! output device.

mod capture;
mod listener;
mod playback;
mod speaker;
mod stt;
mod tts;
mod vad;

pub use capture::{AudioCapture, SAMPLE_RATE, resample_for_speech, samples_to_wav};
pub use listener::{Listener, MicListener};
pub use playback::{AudioPlayback, DecodedAudio, PlaybackOutcome, decode_mp3, play_mp3_file};
pub use speaker::{Playback, PlaybackDone, Speaker, VoiceSpeaker};
pub use stt::{SpeechToText, language_subtag};
pub use tts::TextToSpeech;
pub use vad::{SegmentState, SpeechSegmenter, calculate_energy};
