//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use visionpal::voice::{
    SAMPLE_RATE, SegmentState, SpeechSegmenter, calculate_energy, language_subtag, samples_to_wav,
};

mod common;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

#[test]
fn test_silence_keeps_waiting() {
    let mut segmenter = SpeechSegmenter::new();

    assert_eq!(segmenter.process(&generate_silence(0.5)), SegmentState::Waiting);
    assert!(segmenter.speech_buffer().is_empty());
}

#[test]
fn test_phrase_completes_after_pause() {
    let mut segmenter = SpeechSegmenter::new();

    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    assert_eq!(segmenter.process(&speech), SegmentState::Speaking);

    // Not complete without a pause
    let more = generate_sine_samples(440.0, 0.3, 0.3);
    assert_eq!(segmenter.process(&more), SegmentState::Speaking);

    let pause = generate_silence(0.9);
    assert_eq!(segmenter.process(&pause), SegmentState::Complete);

    let phrase = segmenter.take_speech();
    assert_eq!(phrase.len(), speech.len() + more.len() + pause.len());
    assert_eq!(segmenter.state(), SegmentState::Waiting);
    assert!(segmenter.speech_buffer().is_empty());
}

#[test]
fn test_short_noise_burst_is_discarded() {
    let mut segmenter = SpeechSegmenter::new();

    segmenter.process(&generate_sine_samples(440.0, 0.1, 0.3));
    assert_eq!(segmenter.state(), SegmentState::Speaking);

    assert_eq!(segmenter.process(&generate_silence(0.9)), SegmentState::Waiting);
    assert!(segmenter.speech_buffer().is_empty());
}

#[test]
fn test_speech_buffer_accumulation() {
    let mut segmenter = SpeechSegmenter::new();

    let chunk1 = generate_sine_samples(440.0, 0.1, 0.3);
    segmenter.process(&chunk1);

    let chunk2 = generate_sine_samples(440.0, 0.1, 0.3);
    segmenter.process(&chunk2);

    assert_eq!(segmenter.speech_buffer().len(), chunk1.len() + chunk2.len());
}

#[test]
fn test_calibration_raises_threshold_above_ambient_noise() {
    let mut segmenter = SpeechSegmenter::new();
    let hum = generate_sine_samples(60.0, 0.5, 0.05);

    // Loud enough to count as speech before calibration
    assert!(calculate_energy(&hum) > segmenter.threshold());

    let threshold = segmenter.calibrate(&hum);
    assert!(threshold > calculate_energy(&hum));
    assert_eq!(segmenter.process(&hum), SegmentState::Waiting);

    // Real speech still gets through
    let speech = generate_sine_samples(440.0, 0.2, 0.3);
    assert_eq!(segmenter.process(&speech), SegmentState::Speaking);
}

#[test]
fn test_reset_keeps_calibration() {
    let mut segmenter = SpeechSegmenter::new();
    let threshold = segmenter.calibrate(&generate_sine_samples(60.0, 0.5, 0.05));

    segmenter.process(&generate_sine_samples(440.0, 0.2, 0.3));
    segmenter.reset();

    assert_eq!(segmenter.state(), SegmentState::Waiting);
    assert!((segmenter.threshold() - threshold).abs() < f32::EPSILON);
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV header is 44 bytes
    assert!(wav_data.len() > 44);
}

#[test]
fn test_wav_is_16_bit_mono_at_capture_rate() {
    let input_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&input_samples, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), input_samples.len());
    assert_eq!(read_samples[3], i16::MAX);
}

#[test]
fn test_recognizer_language_hint() {
    assert_eq!(language_subtag("ar-SA").as_deref(), Some("ar"));
    assert_eq!(language_subtag("en-US").as_deref(), Some("en"));
}
