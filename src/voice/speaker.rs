//! Non-blocking speech output with single-playback semantics

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

use super::playback::{PlaybackOutcome, play_mp3_file};
use super::tts::TextToSpeech;
use crate::profile::Language;
use crate::{Error, Result};

/// Something that can speak text aloud
pub trait Speaker: Send + Sync {
    /// Start speaking and return immediately
    ///
    /// Any playback still running is stopped first.
    fn speak(&self, text: &str, language: Language) -> Playback;

    /// Stop the current playback; does nothing when silent
    fn stop(&self);
}

/// Handle to one playback
#[derive(Debug)]
pub struct Playback {
    id: u64,
    done: oneshot::Receiver<()>,
}

/// Completion side of a [`Playback`]
///
/// Dropping it also completes the playback.
#[derive(Debug)]
pub struct PlaybackDone(oneshot::Sender<()>);

impl Playback {
    /// Create a playback handle and its completion side
    #[must_use]
    pub fn new(id: u64) -> (Self, PlaybackDone) {
        let (tx, rx) = oneshot::channel();
        (Self { id, done: rx }, PlaybackDone(tx))
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Resolve when playback is over: completed, stopped or failed
    pub async fn finished(self) {
        let _ = self.done.await;
    }
}

impl PlaybackDone {
    pub fn finish(self) {
        let _ = self.0.send(());
    }
}

/// Stop request shared by a playback task and the speaker
#[derive(Debug, Default)]
struct StopSignal {
    /// Polled by the output stream
    flag: Arc<AtomicBool>,
    wake: Notify,
}

impl StopSignal {
    /// Returns false if the signal was already raised
    fn raise(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::SeqCst);
        // one waiter at most; the stored permit covers a raise before it waits
        self.wake.notify_one();
        first
    }

    fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn raised(&self) {
        if !self.is_raised() {
            self.wake.notified().await;
        }
    }
}

struct ActivePlayback {
    stop: Arc<StopSignal>,
    task: JoinHandle<()>,
}

/// Speaker backed by remote TTS and the default output device
///
/// Must be used from within a tokio runtime.
pub struct VoiceSpeaker {
    tts: Arc<TextToSpeech>,
    next_id: AtomicU64,
    active: Mutex<Option<ActivePlayback>>,
}

impl VoiceSpeaker {
    #[must_use]
    pub fn new(tts: TextToSpeech) -> Self {
        Self {
            tts: Arc::new(tts),
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }
}

impl Speaker for VoiceSpeaker {
    fn speak(&self, text: &str, language: Language) -> Playback {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (playback, done) = Playback::new(id);
        let stop = Arc::new(StopSignal::default());

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = active.take().map(|p| {
            p.stop.raise();
            p.task
        });

        let task = tokio::spawn(run_playback(
            Arc::clone(&self.tts),
            text.to_string(),
            language,
            Arc::clone(&stop),
            previous,
            done,
        ));

        *active = Some(ActivePlayback { stop, task });
        drop(active);

        tracing::debug!(id, %language, "playback scheduled");
        playback
    }

    fn stop(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = active.as_ref() {
            if current.stop.raise() {
                tracing::debug!("playback stop requested");
            }
        }
    }
}

/// Synthesize, play and clean up one utterance
async fn run_playback(
    tts: Arc<TextToSpeech>,
    text: String,
    language: Language,
    stop: Arc<StopSignal>,
    previous: Option<JoinHandle<()>>,
    done: PlaybackDone,
) {
    // the previous output stream must be closed before ours opens
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    match speak_once(&tts, &text, language, &stop).await {
        Ok(outcome) => tracing::debug!(?outcome, "speech finished"),
        Err(e) => tracing::warn!(error = %e, "speech failed"),
    }

    done.finish();
}

async fn speak_once(
    tts: &TextToSpeech,
    text: &str,
    language: Language,
    stop: &StopSignal,
) -> Result<PlaybackOutcome> {
    if stop.is_raised() {
        return Ok(PlaybackOutcome::Stopped);
    }

    let audio = tokio::select! {
        audio = tts.synthesize(text, language.code()) => audio?,
        () = stop.raised() => return Ok(PlaybackOutcome::Stopped),
    };
    if stop.is_raised() {
        return Ok(PlaybackOutcome::Stopped);
    }

    let mut file = tempfile::Builder::new()
        .prefix("visionpal-speech-")
        .suffix(".mp3")
        .tempfile()?;
    file.write_all(&audio)?;
    file.flush()?;
    // deleted when the path is dropped, whatever the outcome
    let path = file.into_temp_path();

    let flag = Arc::clone(&stop.flag);
    tokio::task::spawn_blocking(move || play_mp3_file(&path, &flag))
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
}
