//! Microphone capture
//!
//! Records the default input device at its native format and rate,
//! downmixed to mono. Phrases are resampled to [`SAMPLE_RATE`] before
//! they are sent for transcription.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate of audio sent for recognition (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Resampler input block size
const RESAMPLE_CHUNK: usize = 1024;

/// Mono audio from the default input device
///
/// The cpal stream is not `Send`; create, use and drop a capture on one
/// thread.
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default microphone with its preferred configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if there is no usable input device
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| Error::DeviceUnavailable(format!("no input config: {e}")))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = supported.sample_rate().0,
            channels = supported.channels(),
            format = ?supported.sample_format(),
            "microphone opened"
        );

        Ok(Self {
            device,
            sample_format: supported.sample_format(),
            config: supported.config(),
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start recording into the buffer
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>()?,
            SampleFormat::I16 => self.build_stream::<i16>()?,
            SampleFormat::U16 => self.build_stream::<u16>()?,
            other => {
                return Err(Error::DeviceUnavailable(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::trace!("audio capture started");
        Ok(())
    }

    fn build_stream<T>(&self) -> Result<Stream>
    where
        T: SizedSample,
        f32: cpal::FromSample<T>,
    {
        let buffer = Arc::clone(&self.buffer);
        let channels = usize::from(self.config.channels).max(1);

        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(data.chunks(channels).map(downmix));
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))
    }

    /// Stop recording and release the input stream
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::trace!("audio capture stopped");
        }
    }

    /// Take the samples recorded since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Copy of the recorded samples, leaving them buffered
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Native rate of the buffered samples
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Average one interleaved frame into a mono sample
#[allow(clippy::cast_precision_loss)]
fn downmix<T>(frame: &[T]) -> f32
where
    T: Sample,
    f32: cpal::FromSample<T>,
{
    let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
    sum / frame.len() as f32
}

/// Resample mono audio from `from_rate` to [`SAMPLE_RATE`]
///
/// # Errors
///
/// Returns `Error::Audio` if the resampler cannot be built or fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample_for_speech(samples: &[f32], from_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == SAMPLE_RATE || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        SAMPLE_RATE as usize,
        RESAMPLE_CHUNK,
        2,
        1,
    )
    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let block_len = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected = samples.len() * SAMPLE_RATE as usize / from_rate as usize;
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay + 2 * block_len);

    // trailing silence flushes the resampler's delay line
    let flush = vec![0.0_f32; 2 * block_len];
    for chunk in samples.chunks(block_len).chain(flush.chunks(block_len)) {
        let mut block: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        block.resize(block_len, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect())
}

/// Convert f32 samples to 16-bit mono WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
