//! Vision client tests against a local HTTP server

use std::path::Path;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use visionpal::config::VisionConfig;
use visionpal::describer::run_request_within;
use visionpal::{Describe, DescriberClient, DescriptionRequest, ImageHandle, LanguageProfiles};

mod common;

fn client(base_url: &str, timeout: Duration) -> DescriberClient {
    let config = VisionConfig {
        model: "vision-test".to_string(),
        base_url: format!("{base_url}/v1"),
        max_tokens: None,
        temperature: None,
        timeout,
    };
    DescriberClient::new(&config, SecretString::from("test-key".to_string())).unwrap()
}

/// An image large enough that encoding and upload use part of the deadline
fn large_image(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("street.jpg");
    let mut bytes = common::jpeg_bytes();
    bytes.resize(1024 * 1024, 0x5A);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_stalled_stream_returns_text_received_so_far() {
    let base_url = common::stalling_server(Some(common::partial_sse_reply("A red light"))).await;
    let dir = tempfile::tempdir().unwrap();
    let image = large_image(dir.path());
    let describer = client(&base_url, Duration::from_secs(1));

    let started = Instant::now();
    let text = describer.describe(&image, "what is ahead?").await.unwrap();

    assert_eq!(text, "A red light");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_partial_text_survives_the_request_guard() {
    let base_url = common::stalling_server(Some(common::partial_sse_reply("A red light"))).await;
    let dir = tempfile::tempdir().unwrap();
    let image = large_image(dir.path());
    let timeout = Duration::from_secs(1);
    let describer = client(&base_url, timeout);

    let profiles = LanguageProfiles::default();
    let request = DescriptionRequest::new(
        ImageHandle::selected(image),
        None,
        profiles.get(visionpal::Language::English),
    );

    let result = run_request_within(&describer, &request, timeout).await.unwrap();
    assert_eq!(result.text, "A red light");
}

#[tokio::test]
async fn test_silent_server_times_out_with_service_error() {
    let base_url = common::stalling_server(None).await;
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("door.jpg");
    std::fs::write(&image, common::jpeg_bytes()).unwrap();
    let describer = client(&base_url, Duration::from_millis(300));

    let err = tokio::time::timeout(Duration::from_secs(2), describer.describe(&image, "describe"))
        .await
        .expect("deadline not enforced")
        .unwrap_err();

    assert!(matches!(err, visionpal::Error::Service(ref m) if m.contains("timed out")));
}
