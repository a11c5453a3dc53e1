//! Cancellable audio playback to speakers

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback when the source doesn't specify one
pub const DEFAULT_PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often the blocking wait checks for completion or stop
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Stopped,
}

/// Decoded mono audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays audio to the default output device
///
/// Playback blocks the calling thread; run it on a blocking task.
pub struct AudioPlayback {
    config: StreamConfig,
    sample_rate: u32,
}

impl AudioPlayback {
    /// Open the default output device at a specific rate, mono or stereo
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if no config supports the rate
    pub fn with_sample_rate(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let supports = |channels: u16| {
            device.supported_output_configs().ok().and_then(|mut configs| {
                configs.find(|c| {
                    c.channels() == channels
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
        };

        let supported_config = supports(1).or_else(|| supports(2)).ok_or_else(|| {
            Error::DeviceUnavailable(format!("no output config for {sample_rate} Hz"))
        })?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            sample_rate,
        })
    }

    /// Play samples until they finish or `stop` is raised
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub fn play_blocking(&self, samples: Vec<f32>, stop: &Arc<AtomicBool>) -> Result<PlaybackOutcome> {
        if samples.is_empty() {
            return Ok(PlaybackOutcome::Completed);
        }
        if stop.load(Ordering::SeqCst) {
            return Ok(PlaybackOutcome::Stopped);
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device".to_string()))?;

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let stop = Arc::clone(stop);
            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let halted = stop.load(Ordering::SeqCst);
                        let mut pos = position.load(Ordering::SeqCst);
                        for frame in data.chunks_mut(channels) {
                            let sample = if halted {
                                0.0
                            } else {
                                samples.get(pos).copied().unwrap_or(0.0)
                            };
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::SeqCst);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(self.sample_rate);
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

        let outcome = loop {
            if stop.load(Ordering::SeqCst) {
                break PlaybackOutcome::Stopped;
            }
            if position.load(Ordering::SeqCst) >= sample_count || Instant::now() > deadline {
                break PlaybackOutcome::Completed;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        drop(stream);
        tracing::debug!(samples = sample_count, ?outcome, "playback finished");

        Ok(outcome)
    }
}

/// Decode and play an MP3 file until done or stopped
///
/// # Errors
///
/// Returns error if the file cannot be read or decoded, or output fails
pub fn play_mp3_file(path: &Path, stop: &Arc<AtomicBool>) -> Result<PlaybackOutcome> {
    let data = std::fs::read(path)?;
    let audio = decode_mp3(&data)?;
    if stop.load(Ordering::SeqCst) {
        return Ok(PlaybackOutcome::Stopped);
    }
    AudioPlayback::with_sample_rate(audio.sample_rate)?.play_blocking(audio.samples, stop)
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate.is_none() {
                    sample_rate = u32::try_from(frame.sample_rate).ok();
                }

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: sample_rate.unwrap_or(DEFAULT_PLAYBACK_SAMPLE_RATE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mp3_decodes_to_silence() {
        let audio = decode_mp3(&[]).unwrap();
        assert!(audio.samples.is_empty());
        assert_eq!(audio.sample_rate, DEFAULT_PLAYBACK_SAMPLE_RATE);
    }

    #[test]
    fn missing_file_is_io_error() {
        let stop = Arc::new(AtomicBool::new(false));
        let err = play_mp3_file(Path::new("/no/such/speech.mp3"), &stop).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
