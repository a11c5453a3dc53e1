//! Interaction state machine
//!
//! The controller owns the single [`Session`] and is the only code that
//! mutates it. Everything else (the listen loop, describe requests, playback
//! completion, delayed resets) reaches it as an [`Event`] on one channel, and
//! events are handled one at a time.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::camera::{Frame, FrameSource};
use crate::config::TimingConfig;
use crate::describer::{Describe, DescriptionRequest, DescriptionResult, run_request_within};
use crate::interpreter::{CommandToken, interpret, is_stop_request};
use crate::phrases::{Phrase, error_description};
use crate::picker::FilePicker;
use crate::profile::{Language, LanguageProfiles};
use crate::session::{ImageHandle, InputMethod, Session, State};
use crate::voice::Speaker;
use crate::{Error, Result};

/// Input to the controller
#[derive(Debug)]
pub enum Event {
    /// Recognized speech, already lower-cased
    Utterance(String),

    /// A describe request finished
    Described {
        generation: u64,
        result: Result<DescriptionResult>,
    },

    /// A playback is over
    PlaybackFinished { id: u64 },

    /// Delayed return to idle after a result
    ResetDue { generation: u64 },

    Shutdown,
}

/// Renders controller output
///
/// Every method defaults to doing nothing, so a front end only implements
/// what it can show.
pub trait Presenter: Send + Sync {
    /// A short status line, also spoken when it is a prompt
    fn status(&self, _text: &str) {}

    fn state_changed(&self, _state: State) {}

    /// Description text or a description error
    fn description(&self, _text: &str) {}

    /// Live camera preview; called from the camera thread
    fn frame(&self, _frame: &Frame) {}
}

/// Presenter that shows nothing
#[derive(Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {}

/// External collaborators driven by the controller
pub struct Collaborators {
    pub describer: Arc<dyn Describe>,
    pub speaker: Arc<dyn Speaker>,
    pub camera: Box<dyn FrameSource>,
    pub picker: Arc<dyn FilePicker>,
    pub presenter: Arc<dyn Presenter>,
}

/// The voice-driven state machine
pub struct Controller {
    session: Session,
    profiles: LanguageProfiles,
    timing: TimingConfig,

    describer: Arc<dyn Describe>,
    speaker: Arc<dyn Speaker>,
    /// Only touched from blocking tasks
    camera: Arc<Mutex<Box<dyn FrameSource>>>,
    picker: Arc<dyn FilePicker>,
    presenter: Arc<dyn Presenter>,

    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    locale_tx: watch::Sender<String>,

    /// Generation of the describe request in flight, if any
    in_flight: Option<u64>,
    /// Request waiting for the in-flight one to be delivered
    deferred: Option<DescriptionRequest>,
    /// Id of the playback that owns `is_playing_audio`
    playback: Option<u64>,
}

impl Controller {
    #[must_use]
    pub fn new(collaborators: Collaborators, profiles: LanguageProfiles, timing: TimingConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (locale_tx, _) = watch::channel(Language::English.locale().to_string());

        Self {
            session: Session::new(),
            profiles,
            timing,
            describer: collaborators.describer,
            speaker: collaborators.speaker,
            camera: Arc::new(Mutex::new(collaborators.camera)),
            picker: collaborators.picker,
            presenter: collaborators.presenter,
            events_tx,
            events_rx,
            locale_tx,
            in_flight: None,
            deferred: None,
            playback: None,
        }
    }

    /// Sender for feeding events to the controller
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    /// Recognizer locale of the active language
    #[must_use]
    pub fn locale(&self) -> watch::Receiver<String> {
        self.locale_tx.subscribe()
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.session.state
    }

    /// Whether a describe request is outstanding
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Handle events until [`Event::Shutdown`]
    ///
    /// The controller keeps a sender of its own, so dropping every
    /// [`Controller::sender`] does not end the loop.
    pub async fn run(mut self) {
        tracing::info!("voice controller running");
        self.presenter.state_changed(self.session.state);
        self.presenter.status(Phrase::SayStart.text(None));

        while self.step().await.is_continue() {}

        self.shutdown().await;
        tracing::info!("voice controller stopped");
    }

    /// Wait for the next event, then handle it with everything else pending
    ///
    /// All events already queued form one dispatch window. While audio is
    /// playing, STOP utterances in the window are handled before the rest.
    pub async fn step(&mut self) -> ControlFlow<()> {
        let Some(first) = self.events_rx.recv().await else {
            return ControlFlow::Break(());
        };

        let mut window = vec![first];
        while let Ok(event) = self.events_rx.try_recv() {
            window.push(event);
        }

        if self.session.is_playing_audio {
            let before = window.len();
            window.retain(|e| !matches!(e, Event::Utterance(text) if is_stop_request(text)));
            if window.len() != before {
                self.dispatch(CommandToken::Stop).await;
            }
        }

        for event in window {
            if self.handle(event).await.is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Handle one event
    pub async fn handle(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Utterance(text) => {
                let token = interpret(&text, self.session.state, self.session.is_playing_audio);
                tracing::debug!(utterance = %text, state = %self.session.state, ?token, "utterance");
                self.dispatch(token).await;
            }
            Event::Described { generation, result } => self.deliver(generation, result).await,
            Event::PlaybackFinished { id } => {
                if self.playback == Some(id) {
                    self.playback = None;
                    self.session.is_playing_audio = false;
                }
            }
            Event::ResetDue { generation } => {
                if generation == self.session.generation()
                    && self.session.state == State::Processing
                {
                    self.reset().await;
                }
            }
            Event::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Apply a command token to the current state
    ///
    /// Tokens with no transition from the current state are ignored.
    pub async fn dispatch(&mut self, token: CommandToken) {
        match (self.session.state, token) {
            (_, CommandToken::Stop) => self.stop_playback(),

            (State::WaitingForStart, CommandToken::Start) => {
                self.set_state(State::LanguageSelection);
                self.announce(Phrase::AskLanguage);
            }

            (State::LanguageSelection, CommandToken::LangEn | CommandToken::LangAr) => {
                let language = if token == CommandToken::LangAr {
                    Language::Arabic
                } else {
                    Language::English
                };
                self.session.selected_language = Some(language);
                self.publish_locale();
                tracing::info!(%language, "language selected");
                self.set_state(State::InputMethodSelection);
                self.announce(Phrase::AskInputMethod);
            }

            (State::InputMethodSelection, CommandToken::InputCamera) => {
                self.session.selected_input_method = Some(InputMethod::Camera);
                self.announce(Phrase::CameraStarting);
                self.start_camera().await;
            }

            (State::InputMethodSelection, CommandToken::InputGallery) => {
                self.session.selected_input_method = Some(InputMethod::Gallery);
                self.announce(Phrase::GalleryOpening);
                self.select_from_gallery().await;
            }

            (State::Capturing, CommandToken::Capture) => self.capture().await,

            (state, token) => {
                tracing::trace!(%state, ?token, "no transition");
            }
        }
    }

    /// Issue a describe request on a background task
    ///
    /// Refused while another request is in flight.
    pub fn request_description(&mut self, request: DescriptionRequest) -> bool {
        if let Some(generation) = self.in_flight {
            tracing::warn!(in_flight = generation, "describe request refused: one already in flight");
            return false;
        }

        let generation = self.session.generation();
        self.in_flight = Some(generation);

        let describer = Arc::clone(&self.describer);
        let events = self.events_tx.clone();
        let timeout = self.timing.describe_timeout;

        tracing::info!(generation, image = %request.image.path().display(), "describe requested");
        tokio::spawn(async move {
            let result = run_request_within(describer.as_ref(), &request, timeout).await;
            let _ = events.send(Event::Described { generation, result });
        });

        true
    }

    /// Run a camera operation on the blocking pool
    async fn with_camera<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn FrameSource) -> Result<T> + Send + 'static,
    {
        let camera = Arc::clone(&self.camera);
        tokio::task::spawn_blocking(move || {
            let mut camera = camera.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut **camera)
        })
        .await
        .map_err(|e| Error::Capture(format!("camera task failed: {e}")))?
    }

    async fn start_camera(&mut self) {
        let presenter = Arc::clone(&self.presenter);
        let interval = self.timing.frame_interval;
        let opened = self
            .with_camera(move |camera| {
                camera.open()?;
                camera.subscribe(interval, Box::new(move |frame| presenter.frame(frame)));
                Ok(())
            })
            .await;

        if let Err(e) = opened {
            tracing::warn!(error = %e, "camera open failed");
            self.fail(Phrase::CameraOpenFailed).await;
            return;
        }

        self.set_state(State::Capturing);
        self.presenter.status(self.phrase(Phrase::CameraActive));
    }

    async fn capture(&mut self) {
        let captured = self
            .with_camera(|camera| {
                if !camera.is_open() {
                    return Ok(None);
                }
                let image = camera.read_frame().and_then(|frame| frame.save_temp());
                camera.close();
                image.map(Some)
            })
            .await;

        match captured {
            Ok(Some(image)) => {
                self.announce(Phrase::ImageCaptured);
                self.begin_processing(image);
            }
            Ok(None) => self.fail(Phrase::CameraNotActive).await,
            Err(e) => {
                tracing::warn!(error = %e, "capture failed");
                self.fail(Phrase::CaptureFailed).await;
            }
        }
    }

    async fn select_from_gallery(&mut self) {
        match self.picker.pick_image().await {
            Ok(Some(path)) => {
                tracing::info!(path = %path.display(), "image selected");
                self.announce(Phrase::ImageSelected);
                self.begin_processing(ImageHandle::selected(path));
            }
            Ok(None) => self.fail(Phrase::NoImageSelected).await,
            Err(e) => {
                tracing::warn!(error = %e, "file picker failed");
                self.fail(Phrase::NoImageSelected).await;
            }
        }
    }

    fn begin_processing(&mut self, image: ImageHandle) {
        self.session.current_image = Some(image.clone());
        self.set_state(State::Processing);
        self.presenter.status(self.phrase(Phrase::Analyzing));

        let profile = self.profiles.active(self.session.selected_language);
        let request = DescriptionRequest::new(image, None, profile);
        if !self.request_description(request.clone()) {
            self.deferred = Some(request);
        }
    }

    async fn deliver(&mut self, generation: u64, result: Result<DescriptionResult>) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }

        if generation != self.session.generation() || self.session.state != State::Processing {
            tracing::debug!(generation, current = self.session.generation(), "stale description discarded");
            if let Some(request) = self.deferred.take() {
                self.request_description(request);
            }
            return;
        }

        match result {
            Ok(result) => {
                tracing::info!(chars = result.text.len(), "description ready");
                self.presenter.description(&result.text);
                self.presenter.status(self.phrase(Phrase::AnalysisComplete));
                self.speak(&result.text);
                self.schedule_reset();
            }
            Err(e) => {
                tracing::warn!(error = %e, "description failed");
                self.presenter.description(&error_description(&e));
                self.fail(Phrase::AnalysisError).await;
            }
        }
    }

    /// Speak a localized error and return to idle
    async fn fail(&mut self, phrase: Phrase) {
        tracing::debug!(?phrase, state = %self.session.state, "resetting after failure");
        self.announce(phrase);
        self.reset().await;
    }

    /// Return to idle, releasing the camera
    async fn reset(&mut self) {
        self.close_camera().await;
        self.deferred = None;
        self.session.reset();
        self.publish_locale();
        self.set_state(State::WaitingForStart);
        self.presenter.status(Phrase::SayStart.text(None));
    }

    fn schedule_reset(&self) {
        let generation = self.session.generation();
        let delay = self.timing.reset_delay;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::ResetDue { generation });
        });
    }

    fn stop_playback(&mut self) {
        tracing::info!("stopping playback");
        self.speaker.stop();
        self.session.is_playing_audio = false;
        self.playback = None;
    }

    /// Show and speak a phrase in the active language
    fn announce(&mut self, phrase: Phrase) {
        let text = self.phrase(phrase);
        self.presenter.status(text);
        self.speak(text);
    }

    fn speak(&mut self, text: &str) {
        let language = self.session.selected_language.unwrap_or(Language::English);
        let playback = self.speaker.speak(text, language);
        let id = playback.id();
        self.playback = Some(id);
        self.session.is_playing_audio = true;

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            playback.finished().await;
            let _ = events.send(Event::PlaybackFinished { id });
        });
    }

    fn phrase(&self, phrase: Phrase) -> &'static str {
        phrase.text(self.session.selected_language)
    }

    fn set_state(&mut self, state: State) {
        if self.session.state != state {
            tracing::debug!(from = %self.session.state, to = %state, "state change");
        }
        self.session.state = state;
        self.presenter.state_changed(state);
    }

    fn publish_locale(&self) {
        let locale = self.profiles.active(self.session.selected_language).locale;
        self.locale_tx.send_if_modified(|current| {
            if *current == locale {
                false
            } else {
                *current = locale.to_string();
                true
            }
        });
    }

    async fn close_camera(&self) {
        let closed = self
            .with_camera(|camera| {
                camera.close();
                Ok(())
            })
            .await;
        if let Err(e) = closed {
            tracing::warn!(error = %e, "camera close failed");
        }
    }

    async fn shutdown(&mut self) {
        self.close_camera().await;
        self.speaker.stop();
        self.session.is_playing_audio = false;
    }
}
