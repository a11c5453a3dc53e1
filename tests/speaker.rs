//! Speech output tests against a synthesis service that never answers

use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use visionpal::Language;
use visionpal::config::VoiceConfig;
use visionpal::voice::{Speaker, SpeechToText, TextToSpeech, VoiceSpeaker};

mod common;

fn voice_config(base_url: &str, request_timeout: Duration) -> VoiceConfig {
    VoiceConfig {
        base_url: base_url.to_string(),
        stt_model: "stt-test".to_string(),
        tts_model: "tts-test".to_string(),
        tts_voice: "test voice".to_string(),
        listen_timeout: Duration::from_secs(1),
        phrase_limit: Duration::from_secs(5),
        calibration: Duration::ZERO,
        request_timeout,
    }
}

async fn stalled_speaker(request_timeout: Duration) -> Arc<VoiceSpeaker> {
    let base_url = common::stalling_server(None).await;
    let config = voice_config(&base_url, request_timeout);
    let tts = TextToSpeech::new(&config, SecretString::from("test-key".to_string())).unwrap();
    Arc::new(VoiceSpeaker::new(tts))
}

#[tokio::test]
async fn test_stop_ends_playback_during_synthesis() {
    let speaker = stalled_speaker(Duration::from_secs(60)).await;

    let playback = speaker.speak("please say english or arabic", Language::English);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopped = Instant::now();
    speaker.stop();
    tokio::time::timeout(Duration::from_secs(1), playback.finished())
        .await
        .expect("playback kept going after stop");
    assert!(stopped.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_new_speech_supersedes_stalled_synthesis() {
    let speaker = stalled_speaker(Duration::from_secs(60)).await;

    let first = speaker.speak("please say english or arabic", Language::English);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = speaker.speak("no image selected", Language::English);

    tokio::time::timeout(Duration::from_secs(1), first.finished())
        .await
        .expect("superseded playback did not end");

    speaker.stop();
    tokio::time::timeout(Duration::from_secs(1), second.finished())
        .await
        .expect("second playback ignored stop");
}

#[tokio::test]
async fn test_synthesis_gives_up_after_request_timeout() {
    let speaker = stalled_speaker(Duration::from_millis(300)).await;

    let playback = speaker.speak("analysis complete", Language::English);
    tokio::time::timeout(Duration::from_secs(2), playback.finished())
        .await
        .expect("synthesis ignored the request timeout");
}

#[tokio::test]
async fn test_transcription_gives_up_after_request_timeout() {
    let base_url = common::stalling_server(None).await;
    let config = voice_config(&base_url, Duration::from_millis(300));
    let stt = SpeechToText::new(&config, SecretString::from("test-key".to_string())).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), stt.transcribe(b"RIFF", "en-US"))
        .await
        .expect("transcription ignored the request timeout");
    assert!(result.is_err());
}
