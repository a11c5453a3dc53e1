//! Daemon - voice mode
//!
//! Wires the real collaborators into the controller and runs it alongside
//! the listen loop until interrupted.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::camera::FfmpegCamera;
use crate::controller::{Collaborators, Controller, Event, Presenter};
use crate::describer::DescriberClient;
use crate::listen::run_listen_loop;
use crate::picker::DialogPicker;
use crate::voice::{Listener, MicListener, SpeechToText, TextToSpeech, VoiceSpeaker};
use crate::{Config, Result};

/// The `VisionPal` voice assistant
pub struct Daemon {
    controller: Controller,
    listener: Arc<dyn Listener>,
    config: Config,
}

impl Daemon {
    /// Build the voice assistant from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API credential is missing or a
    /// placeholder, or an error if the HTTP client cannot be built
    pub fn new(config: Config, presenter: Arc<dyn Presenter>) -> Result<Self> {
        let api_key = config.api_key()?;

        let describer = DescriberClient::new(&config.vision, api_key.clone())?;
        tracing::info!(
            model = %config.vision.model,
            base_url = %config.vision.base_url,
            "vision describer initialized"
        );

        let speaker = VoiceSpeaker::new(TextToSpeech::new(&config.voice, api_key.clone())?);
        let listener = MicListener::new(
            SpeechToText::new(&config.voice, api_key)?,
            config.voice.phrase_limit,
            config.voice.calibration,
        );

        let collaborators = Collaborators {
            describer: Arc::new(describer),
            speaker: Arc::new(speaker),
            camera: Box::new(FfmpegCamera::new(config.camera.clone())),
            picker: Arc::new(DialogPicker),
            presenter,
        };

        let controller = Controller::new(collaborators, config.profiles.clone(), config.timing);

        Ok(Self {
            controller,
            listener: Arc::new(listener),
            config,
        })
    }

    /// Run until interrupted
    pub async fn run(self) {
        let events = self.controller.sender();
        let locale = self.controller.locale();

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let ctrl_c_events = events.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                let _ = shutdown_tx.send(()).await;
                let _ = ctrl_c_events.send(Event::Shutdown);
            }
        });

        let listen_handle = tokio::spawn(run_listen_loop(
            Arc::clone(&self.listener),
            self.config.voice.listen_timeout,
            locale,
            events,
            shutdown_rx,
        ));

        tracing::info!("visionpal ready - say \"start\"");
        self.controller.run().await;

        // a recording already in progress finishes on its blocking thread
        listen_handle.abort();
        if let Err(e) = listen_handle.await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "listen loop ended abnormally");
            }
        }
    }
}
