//! Shared test utilities
//!
//! Hand-written mocks for every collaborator the controller drives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use visionpal::camera::{DeviceLease, Frame, FrameCallback, FrameSource};
use visionpal::config::TimingConfig;
use visionpal::controller::{Collaborators, Controller, Presenter};
use visionpal::describer::Describe;
use visionpal::picker::FilePicker;
use visionpal::voice::{Listener, Playback, PlaybackDone, Speaker};
use visionpal::{Error, Language, LanguageProfiles, RecognitionError, State};

/// A tiny but well-formed JPEG marker sequence
#[must_use]
pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]
}

/// Timing short enough for tests
#[must_use]
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        reset_delay: Duration::from_millis(10),
        frame_interval: Duration::from_millis(5),
        describe_timeout: Duration::from_secs(2),
    }
}

/// What the mock describer answers
#[derive(Debug, Clone)]
pub enum Answer {
    Text(String),
    Fail(String),
}

/// Describer returning a fixed answer, optionally held until released
pub struct MockDescriber {
    answer: Mutex<Answer>,
    hold: AtomicBool,
    release: Notify,
    calls: Mutex<Vec<(PathBuf, String, bool)>>,
}

impl MockDescriber {
    pub fn new(answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(answer),
            hold: AtomicBool::new(false),
            release: Notify::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn text(text: &str) -> Arc<Self> {
        Self::new(Answer::Text(text.to_string()))
    }

    /// Block every call until `release` is called
    pub fn held(answer: Answer) -> Arc<Self> {
        let describer = Self::new(answer);
        describer.hold.store(true, Ordering::SeqCst);
        describer
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    /// (image, prompt, image readable at call time)
    pub fn calls(&self) -> Vec<(PathBuf, String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Describe for MockDescriber {
    async fn describe(&self, image: &Path, prompt: &str) -> visionpal::Result<String> {
        let readable = std::fs::read(image).is_ok();
        self.calls
            .lock()
            .unwrap()
            .push((image.to_path_buf(), prompt.to_string(), readable));

        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }

        match self.answer.lock().unwrap().clone() {
            Answer::Text(text) => Ok(text),
            Answer::Fail(cause) => Err(Error::Service(cause)),
        }
    }
}

/// Speaker that records text and keeps "playing" until stopped or finished
#[derive(Default)]
pub struct MockSpeaker {
    spoken: Mutex<Vec<(String, Language)>>,
    active: Mutex<Vec<PlaybackDone>>,
    next_id: AtomicUsize,
    stops: AtomicUsize,
    auto_finish: bool,
}

impl MockSpeaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Speaker whose playbacks end immediately
    pub fn instant() -> Arc<Self> {
        Arc::new(Self {
            auto_finish: true,
            ..Self::default()
        })
    }

    pub fn spoken(&self) -> Vec<(String, Language)> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|(text, _)| text).collect()
    }

    pub fn last_spoken(&self) -> Option<String> {
        self.spoken_texts().pop()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// End every playback as if the audio ran out
    pub fn finish_all(&self) {
        for done in self.active.lock().unwrap().drain(..) {
            done.finish();
        }
    }
}

impl Speaker for MockSpeaker {
    fn speak(&self, text: &str, language: Language) -> Playback {
        self.spoken.lock().unwrap().push((text.to_string(), language));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let (playback, done) = Playback::new(id);

        let mut active = self.active.lock().unwrap();
        // the previous playback ends when a new one starts
        for previous in active.drain(..) {
            previous.finish();
        }
        if self.auto_finish {
            done.finish();
        } else {
            active.push(done);
        }
        playback
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        for done in self.active.lock().unwrap().drain(..) {
            done.finish();
        }
    }
}

/// Observable state of a [`MockCamera`]
#[derive(Default)]
pub struct CameraControls {
    pub open: AtomicBool,
    pub fail_open: AtomicBool,
    pub fail_read: AtomicBool,
    pub opens: AtomicUsize,
    pub subscriptions: AtomicUsize,
    /// How long `open` blocks, like a device warming up
    pub open_delay_ms: AtomicU64,
}

impl CameraControls {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Camera holding a real device lease while open
pub struct MockCamera {
    device: String,
    controls: Arc<CameraControls>,
    lease: Option<DeviceLease>,
}

impl MockCamera {
    pub fn new(device: &str) -> (Self, Arc<CameraControls>) {
        let controls = Arc::new(CameraControls::default());
        (
            Self {
                device: device.to_string(),
                controls: Arc::clone(&controls),
                lease: None,
            },
            controls,
        )
    }
}

impl FrameSource for MockCamera {
    fn open(&mut self) -> visionpal::Result<()> {
        if self.lease.is_some() {
            return Ok(());
        }
        let delay = self.controls.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.controls.fail_open.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable("mock camera unplugged".to_string()));
        }
        self.lease = Some(DeviceLease::acquire(&self.device)?);
        self.controls.opens.fetch_add(1, Ordering::SeqCst);
        self.controls.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&mut self) -> visionpal::Result<Frame> {
        if self.lease.is_none() {
            return Err(Error::Capture("camera is not open".to_string()));
        }
        if self.controls.fail_read.load(Ordering::SeqCst) {
            return Err(Error::Capture("mock frame grab failed".to_string()));
        }
        Ok(Frame::new(jpeg_bytes()))
    }

    fn subscribe(&mut self, _interval: Duration, callback: FrameCallback) {
        self.controls.subscriptions.fetch_add(1, Ordering::SeqCst);
        callback(&Frame::new(jpeg_bytes()));
    }

    fn close(&mut self) {
        self.lease = None;
        self.controls.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.lease.is_some()
    }
}

/// Picker returning a fixed selection
pub struct MockPicker {
    selection: Mutex<Option<PathBuf>>,
    picks: AtomicUsize,
}

impl MockPicker {
    pub fn new(selection: Option<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            selection: Mutex::new(selection),
            picks: AtomicUsize::new(0),
        })
    }

    pub fn picks(&self) -> usize {
        self.picks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FilePicker for MockPicker {
    async fn pick_image(&self) -> visionpal::Result<Option<PathBuf>> {
        self.picks.fetch_add(1, Ordering::SeqCst);
        Ok(self.selection.lock().unwrap().clone())
    }
}

/// Presenter recording everything it is shown
#[derive(Default)]
pub struct RecordingPresenter {
    pub statuses: Mutex<Vec<String>>,
    pub states: Mutex<Vec<State>>,
    pub descriptions: Mutex<Vec<String>>,
    pub frames: AtomicUsize,
}

impl RecordingPresenter {
    pub fn descriptions(&self) -> Vec<String> {
        self.descriptions.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn status(&self, text: &str) {
        self.statuses.lock().unwrap().push(text.to_string());
    }

    fn state_changed(&self, state: State) {
        self.states.lock().unwrap().push(state);
    }

    fn description(&self, text: &str) {
        self.descriptions.lock().unwrap().push(text.to_string());
    }

    fn frame(&self, _frame: &Frame) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

/// Listener replaying a script, then waiting forever
pub struct MockListener {
    script: Mutex<VecDeque<Result<String, RecognitionError>>>,
    locales: Mutex<Vec<String>>,
    pace: Duration,
}

impl MockListener {
    pub fn new(script: Vec<Result<String, RecognitionError>>) -> Arc<Self> {
        Self::paced(script, Duration::ZERO)
    }

    /// Each listen takes `pace` before answering
    pub fn paced(script: Vec<Result<String, RecognitionError>>, pace: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            locales: Mutex::new(Vec::new()),
            pace,
        })
    }

    pub fn locales(&self) -> Vec<String> {
        self.locales.lock().unwrap().clone()
    }
}

#[async_trait]
impl Listener for MockListener {
    async fn listen(&self, _timeout: Duration, locale: &str) -> Result<String, RecognitionError> {
        self.locales.lock().unwrap().push(locale.to_string());
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

/// A controller wired to mocks, with handles to observe them
pub struct Harness {
    pub controller: Controller,
    pub describer: Arc<MockDescriber>,
    pub speaker: Arc<MockSpeaker>,
    pub camera: Arc<CameraControls>,
    pub picker: Arc<MockPicker>,
    pub presenter: Arc<RecordingPresenter>,
}

impl Harness {
    /// Build a harness; `device` must be unique per test
    pub fn new(device: &str, describer: Arc<MockDescriber>, selection: Option<PathBuf>) -> Self {
        Self::with_timing(device, describer, selection, fast_timing())
    }

    pub fn with_timing(
        device: &str,
        describer: Arc<MockDescriber>,
        selection: Option<PathBuf>,
        timing: TimingConfig,
    ) -> Self {
        let speaker = MockSpeaker::new();
        let (camera, controls) = MockCamera::new(device);
        let picker = MockPicker::new(selection);
        let presenter = Arc::new(RecordingPresenter::default());

        let collaborators = Collaborators {
            describer: Arc::clone(&describer) as Arc<dyn Describe>,
            speaker: Arc::clone(&speaker) as Arc<dyn Speaker>,
            camera: Box::new(camera),
            picker: Arc::clone(&picker) as Arc<dyn FilePicker>,
            presenter: Arc::clone(&presenter) as Arc<dyn Presenter>,
        };

        Self {
            controller: Controller::new(collaborators, LanguageProfiles::default(), timing),
            describer,
            speaker,
            camera: controls,
            picker,
            presenter,
        }
    }

    /// Feed utterances one at a time
    pub async fn say(&mut self, utterances: &[&str]) {
        for utterance in utterances {
            let _ = self
                .controller
                .handle(visionpal::Event::Utterance((*utterance).to_string()))
                .await;
        }
    }

    /// Process events until `done` holds, failing after a second
    pub async fn pump_until(&mut self, done: impl Fn(&Controller) -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !done(&self.controller) {
                let _ = self.controller.step().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }
}

/// Local HTTP server that never finishes a response
///
/// With `reply`, each request is read in full and `reply` is written
/// before the connection goes quiet; without it nothing is ever sent.
/// Returns the base URL.
pub async fn stalling_server(reply: Option<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = reply.clone();
            tokio::spawn(async move {
                if let Some(reply) = reply {
                    read_request(&mut socket).await;
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.flush().await;
                }
                std::future::pending::<()>().await;
                drop(socket);
            });
        }
    });

    format!("http://{addr}")
}

/// Consume one request: headers plus a `content-length` body
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = vec![0_u8; 64 * 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return;
        }
    }
}

/// Response head and one completion chunk of a streamed chat reply
pub fn partial_sse_reply(text: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\ndata: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
    )
}
