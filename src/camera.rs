//! Camera capture through an `ffmpeg` child process
//!
//! `ffmpeg` reads the platform video device and writes an MJPEG stream to
//! stdout. A reader thread splits the stream into JPEG frames and keeps the
//! latest one for snapshots and preview.

use std::collections::{BTreeSet, VecDeque};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::CameraConfig;
use crate::session::ImageHandle;
use crate::{Error, Result};

/// How long `open` waits for the first frame before trusting the process
const STARTUP_GRACE: Duration = Duration::from_millis(1500);

/// How long `read_frame` waits for a frame to arrive
const FRAME_WAIT: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 64 * 1024;

/// ffmpeg diagnostic lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Devices with an open session in this process
static OPEN_DEVICES: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());

/// Preview callback
pub type FrameCallback = Box<dyn Fn(&Frame) + Send + Sync>;

/// A single JPEG-encoded camera frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    jpeg: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub const fn new(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }

    #[must_use]
    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Write the frame to a temporary `.jpg` owned by the returned handle
    ///
    /// # Errors
    ///
    /// Returns error if the temporary file cannot be written
    pub fn save_temp(&self) -> Result<ImageHandle> {
        let mut file = tempfile::Builder::new()
            .prefix("visionpal-capture-")
            .suffix(".jpg")
            .tempfile()?;
        file.write_all(&self.jpeg)?;
        file.flush()?;
        let path = file.into_temp_path();
        tracing::debug!(path = %path.display(), bytes = self.jpeg.len(), "frame saved");
        Ok(ImageHandle::captured(path))
    }
}

/// A source of camera frames with exclusive device ownership
pub trait FrameSource: Send {
    /// Acquire the device
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the device is missing or in use
    fn open(&mut self) -> Result<()>;

    /// Latest frame from the open device
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if the device is closed or produced no frame
    fn read_frame(&mut self) -> Result<Frame>;

    /// Call `callback` with new frames every `interval` until closed
    fn subscribe(&mut self, interval: Duration, callback: FrameCallback);

    /// Release the device; safe to call when already closed
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// ffmpeg invocation for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub input_format: String,
    pub device: String,
}

impl DeviceSpec {
    /// Resolve the device from configuration and the host platform
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` when the platform needs an explicit
    /// device name that was not configured
    pub fn resolve(config: &CameraConfig) -> Result<Self> {
        let input_format = config
            .input_format
            .clone()
            .unwrap_or_else(|| default_input_format().to_string());

        let device = match &config.device {
            Some(device) => device.clone(),
            None => match input_format.as_str() {
                "v4l2" => format!("/dev/video{}", config.device_index),
                "avfoundation" => config.device_index.to_string(),
                other => {
                    return Err(Error::DeviceUnavailable(format!(
                        "camera.device must be set for input format {other}"
                    )));
                }
            },
        };

        Ok(Self {
            input_format,
            device,
        })
    }

    /// ffmpeg arguments producing MJPEG on stdout
    #[must_use]
    pub fn ffmpeg_args(&self) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            self.input_format.as_str(),
            "-i",
            self.device.as_str(),
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-q:v",
            "3",
            "-",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }
}

const fn default_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

/// Registration of an open device; released on drop
#[derive(Debug)]
pub struct DeviceLease {
    device: String,
}

impl DeviceLease {
    /// Register `device`, failing if another session holds it
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the device is already open
    pub fn acquire(device: &str) -> Result<Self> {
        let mut open = OPEN_DEVICES.lock().unwrap_or_else(PoisonError::into_inner);
        if !open.insert(device.to_string()) {
            return Err(Error::DeviceUnavailable(format!("camera {device} is already in use")));
        }
        Ok(Self {
            device: device.to_string(),
        })
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        OPEN_DEVICES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.device);
    }
}

/// Latest frame with a sequence number so preview skips repeats
#[derive(Default)]
struct LatestFrame {
    seq: u64,
    frame: Option<Frame>,
}

type SharedFrame = Arc<Mutex<LatestFrame>>;

struct OpenCamera {
    child: Child,
    reader: Option<JoinHandle<()>>,
    /// Drains stderr until ffmpeg exits, returning the last lines
    stderr: Option<JoinHandle<String>>,
    running: Arc<AtomicBool>,
    latest: SharedFrame,
    _lease: DeviceLease,
}

/// Camera driven by an `ffmpeg` child process
pub struct FfmpegCamera {
    config: CameraConfig,
    open: Option<OpenCamera>,
    previews: Vec<JoinHandle<()>>,
}

impl FfmpegCamera {
    #[must_use]
    pub const fn new(config: CameraConfig) -> Self {
        Self {
            config,
            open: None,
            previews: Vec::new(),
        }
    }

    fn ffmpeg_binary(&self) -> Result<PathBuf> {
        let name = self.config.ffmpeg.as_deref().unwrap_or("ffmpeg");
        which::which(name)
            .map_err(|e| Error::DeviceUnavailable(format!("{name} not found: {e}")))
    }
}

impl FrameSource for FfmpegCamera {
    fn open(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Ok(());
        }

        let spec = DeviceSpec::resolve(&self.config)?;
        if spec.input_format == "v4l2" && !std::path::Path::new(&spec.device).exists() {
            return Err(Error::DeviceUnavailable(format!("{} does not exist", spec.device)));
        }

        let ffmpeg = self.ffmpeg_binary()?;
        let lease = DeviceLease::acquire(&spec.device)?;

        let mut child = Command::new(&ffmpeg)
            .args(spec.ffmpeg_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::DeviceUnavailable(format!("failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::DeviceUnavailable("ffmpeg stdout unavailable".to_string()))?;

        let stderr = child
            .stderr
            .take()
            .map(|pipe| std::thread::spawn(move || drain_stderr(pipe)));

        let running = Arc::new(AtomicBool::new(true));
        let latest = SharedFrame::default();
        let reader = {
            let running = Arc::clone(&running);
            let latest = Arc::clone(&latest);
            std::thread::spawn(move || read_frames(stdout, &running, &latest))
        };

        let mut camera = OpenCamera {
            child,
            reader: Some(reader),
            stderr,
            running,
            latest,
            _lease: lease,
        };

        // ffmpeg exits quickly when the device can't be opened
        let started = Instant::now();
        while started.elapsed() < STARTUP_GRACE {
            if has_frame(&camera.latest) {
                break;
            }
            if let Ok(Some(status)) = camera.child.try_wait() {
                let stderr = shutdown(&mut camera);
                return Err(Error::DeviceUnavailable(format!(
                    "ffmpeg exited with {status}: {}",
                    stderr.trim()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        tracing::info!(device = %spec.device, format = %spec.input_format, "camera opened");
        self.open = Some(camera);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let camera = self
            .open
            .as_ref()
            .ok_or_else(|| Error::Capture("camera is not open".to_string()))?;

        let started = Instant::now();
        loop {
            if let Some(frame) = camera
                .latest
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .frame
                .clone()
            {
                return Ok(frame);
            }
            if !camera.running.load(Ordering::SeqCst) || started.elapsed() >= FRAME_WAIT {
                return Err(Error::Capture("no frame received from camera".to_string()));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn subscribe(&mut self, interval: Duration, callback: FrameCallback) {
        let Some(camera) = self.open.as_ref() else {
            tracing::debug!("preview requested while camera closed");
            return;
        };

        let running = Arc::clone(&camera.running);
        let latest = Arc::clone(&camera.latest);
        let handle = std::thread::spawn(move || {
            let mut last_seq = 0;
            while running.load(Ordering::SeqCst) {
                let next = {
                    let slot = latest.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.seq == last_seq {
                        None
                    } else {
                        last_seq = slot.seq;
                        slot.frame.clone()
                    }
                };
                if let Some(frame) = next {
                    callback(&frame);
                }
                std::thread::sleep(interval);
            }
        });
        self.previews.push(handle);
    }

    fn close(&mut self) {
        let Some(mut camera) = self.open.take() else {
            return;
        };
        shutdown(&mut camera);
        for preview in self.previews.drain(..) {
            let _ = preview.join();
        }
        tracing::info!("camera closed");
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.close();
    }
}

fn has_frame(latest: &SharedFrame) -> bool {
    latest
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .frame
        .is_some()
}

/// Read ffmpeg's diagnostics until the pipe closes, keeping the last lines
fn drain_stderr(pipe: impl Read) -> String {
    let mut reader = BufReader::new(pipe);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        tracing::trace!(target: "visionpal::camera::ffmpeg", "{line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Stop the process and wait for its threads, returning ffmpeg's last output
fn shutdown(camera: &mut OpenCamera) -> String {
    camera.running.store(false, Ordering::SeqCst);
    if let Err(e) = camera.child.kill() {
        tracing::trace!(error = %e, "ffmpeg already exited");
    }
    let _ = camera.child.wait();
    if let Some(reader) = camera.reader.take() {
        let _ = reader.join();
    }
    camera
        .stderr
        .take()
        .and_then(|drain| drain.join().ok())
        .unwrap_or_default()
}

fn read_frames(mut stdout: impl Read, running: &AtomicBool, latest: &SharedFrame) {
    let mut splitter = MjpegSplitter::default();
    let mut chunk = vec![0_u8; READ_CHUNK];

    while running.load(Ordering::SeqCst) {
        let n = match stdout.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "camera stream read failed");
                break;
            }
        };

        if let Some(frame) = splitter.push(&chunk[..n]).pop() {
            let mut slot = latest.lock().unwrap_or_else(PoisonError::into_inner);
            slot.seq = slot.seq.wrapping_add(1);
            slot.frame = Some(Frame::new(frame));
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::debug!("camera stream ended");
}

/// Splits a concatenated MJPEG byte stream into JPEG images
#[derive(Debug, Default)]
pub struct MjpegSplitter {
    buf: Vec<u8>,
}

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

impl MjpegSplitter {
    /// Append bytes and return every complete image found, oldest first
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            let Some(start) = find(&self.buf, SOI, 0) else {
                // keep a trailing 0xFF that may begin a marker
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
                break;
            };
            let Some(end) = find(&self.buf, EOI, start + 2) else {
                self.buf.drain(..start);
                break;
            };
            frames.push(self.buf[start..end + 2].to_vec());
            self.buf.drain(..end + 2);
        }

        frames
    }
}

fn find(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut v = SOI.to_vec();
        v.extend_from_slice(body);
        v.extend_from_slice(&EOI);
        v
    }

    #[test]
    fn stderr_drain_reads_to_end_and_keeps_the_tail() {
        let mut output = Vec::new();
        for i in 0..30 {
            output.extend_from_slice(format!("frame={i}\n").as_bytes());
        }
        output.extend_from_slice(b"bad \xFF byte\n/dev/video9: No such device\n");

        let tail = drain_stderr(output.as_slice());
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.last().copied(), Some("/dev/video9: No such device"));
        assert!(lines.contains(&"frame=29"));
        assert!(!lines.contains(&"frame=0"));
    }

    #[test]
    fn splits_concatenated_frames() {
        let mut stream = jpeg(b"one");
        stream.extend(jpeg(b"two"));

        let mut splitter = MjpegSplitter::default();
        let frames = splitter.push(&stream);
        assert_eq!(frames, vec![jpeg(b"one"), jpeg(b"two")]);
    }

    #[test]
    fn frame_split_across_reads() {
        let frame = jpeg(b"split across chunks");
        let (a, b) = frame.split_at(5);

        let mut splitter = MjpegSplitter::default();
        assert!(splitter.push(a).is_empty());
        assert_eq!(splitter.push(b), vec![frame]);
    }

    #[test]
    fn marker_split_across_reads() {
        let mut splitter = MjpegSplitter::default();
        assert!(splitter.push(&[0x00, 0xFF]).is_empty());
        assert_eq!(splitter.push(&[0xD8, 0x01, 0xFF, 0xD9]), vec![vec![
            0xFF, 0xD8, 0x01, 0xFF, 0xD9
        ]]);
    }

    #[test]
    fn second_lease_on_same_device_fails_until_released() {
        let lease = DeviceLease::acquire("/dev/video-test-lease").unwrap();
        let err = DeviceLease::acquire("/dev/video-test-lease").unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));

        drop(lease);
        assert!(DeviceLease::acquire("/dev/video-test-lease").is_ok());
    }

    #[test]
    fn resolves_v4l2_device_from_index() {
        let config = CameraConfig {
            device_index: 2,
            input_format: Some("v4l2".to_string()),
            ..CameraConfig::default()
        };
        let spec = DeviceSpec::resolve(&config).unwrap();
        assert_eq!(spec.device, "/dev/video2");
        assert!(spec.ffmpeg_args().contains(&"image2pipe".to_string()));
    }

    #[test]
    fn dshow_requires_device_name() {
        let config = CameraConfig {
            input_format: Some("dshow".to_string()),
            ..CameraConfig::default()
        };
        assert!(DeviceSpec::resolve(&config).is_err());
    }

    #[test]
    fn read_frame_on_closed_camera_is_capture_error() {
        let mut camera = FfmpegCamera::new(CameraConfig::default());
        assert!(!camera.is_open());
        assert!(matches!(camera.read_frame(), Err(Error::Capture(_))));
        camera.close();
    }

    #[test]
    fn saved_frame_is_removed_with_handle() {
        let handle = Frame::new(jpeg(b"pixels")).save_temp().unwrap();
        let path = handle.path().to_path_buf();
        assert!(path.exists());
        assert!(handle.is_captured());
        drop(handle);
        assert!(!path.exists());
    }
}
