//! Terminal front end
//!
//! [`ConsolePresenter`] renders voice mode. [`DescribeSession`] drives
//! describe mode: one image, an optional typed or spoken prompt, and
//! follow-up questions about the same image.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dialoguer::Input;

use crate::camera::Frame;
use crate::controller::Presenter;
use crate::describer::{Describe, DescriptionRequest, run_request_within};
use crate::interpreter::is_stop_request;
use crate::phrases::{Phrase, error_description};
use crate::profile::LanguageProfile;
use crate::session::{ImageHandle, State};
use crate::voice::{Listener, Speaker};
use crate::{Error, Result};

/// How long to wait for a spoken prompt to begin
pub const PROMPT_LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Prints controller output to the terminal
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    frames: AtomicU64,
}

impl ConsolePresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for ConsolePresenter {
    fn status(&self, text: &str) {
        println!("> {text}");
    }

    fn state_changed(&self, state: State) {
        tracing::debug!(%state, "state changed");
        if state == State::WaitingForStart {
            self.frames.store(0, Ordering::Relaxed);
        }
    }

    fn description(&self, text: &str) {
        println!("\n{text}\n");
    }

    fn frame(&self, frame: &Frame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 100 == 0 {
            tracing::trace!(frames = count, bytes = frame.jpeg().len(), "camera preview");
        }
    }
}

/// One image described on demand, with follow-up questions
pub struct DescribeSession {
    describer: Arc<dyn Describe>,
    speaker: Option<Arc<dyn Speaker>>,
    listener: Option<Arc<dyn Listener>>,
    profile: LanguageProfile,
    image: ImageHandle,
    timeout: Duration,
}

impl DescribeSession {
    #[must_use]
    pub fn new(
        describer: Arc<dyn Describe>,
        image: ImageHandle,
        profile: LanguageProfile,
        timeout: Duration,
    ) -> Self {
        Self {
            describer,
            speaker: None,
            listener: None,
            profile,
            image,
            timeout,
        }
    }

    /// Speak descriptions aloud
    #[must_use]
    pub fn with_speaker(mut self, speaker: Arc<dyn Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Take prompts and follow-ups by voice instead of the keyboard
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Describe the image, then answer follow-ups while `ask` is set
    ///
    /// # Errors
    ///
    /// Returns error if reading a typed question fails
    pub async fn run(&self, prompt: Option<String>, ask: bool) -> Result<()> {
        let prompt = match prompt {
            Some(prompt) => Some(prompt),
            None if self.listener.is_some() => self.listen_for_prompt().await,
            None => None,
        };

        let text = self.describe(prompt.as_deref()).await;
        self.present(&text).await;

        if !ask {
            return Ok(());
        }

        while let Some(question) = self.next_question().await? {
            let text = self.describe(Some(&question)).await;
            self.present(&text).await;
        }

        Ok(())
    }

    /// Description text for `prompt`, or the error text on failure
    pub async fn describe(&self, prompt: Option<&str>) -> String {
        let request = DescriptionRequest::new(self.image.clone(), prompt, &self.profile);
        println!("> {}", Phrase::Analyzing.text(Some(self.profile.language)));

        let result = run_request_within(self.describer.as_ref(), &request, self.timeout).await;

        match result {
            Ok(result) => result.text,
            Err(e) => {
                tracing::warn!(error = %e, "description failed");
                error_description(&e)
            }
        }
    }

    async fn present(&self, text: &str) {
        println!("\n{text}\n");
        self.say(text).await;
    }

    /// Speak and wait for playback to end
    async fn say(&self, text: &str) {
        if let Some(speaker) = &self.speaker {
            speaker.speak(text, self.profile.language).finished().await;
        }
    }

    /// Ask for a spoken prompt; `None` falls back to the default prompt
    async fn listen_for_prompt(&self) -> Option<String> {
        let listener = self.listener.as_ref()?;
        let invite = Phrase::AskQuestion.text(Some(self.profile.language));
        println!("> {invite}");
        self.say(invite).await;

        match listener.listen(PROMPT_LISTEN_TIMEOUT, self.profile.locale).await {
            Ok(text) => {
                println!("? {text}");
                Some(text)
            }
            Err(e) => {
                tracing::info!(error = %e, "no spoken prompt, using default");
                None
            }
        }
    }

    /// Next follow-up question; `None` ends the session
    async fn next_question(&self) -> Result<Option<String>> {
        if self.listener.is_some() {
            let question = self.listen_for_prompt().await;
            return Ok(question.filter(|q| !is_stop_request(q)));
        }

        let question = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("Follow-up question (blank to quit)")
                .allow_empty(true)
                .interact_text()
        })
        .await
        .map_err(|e| Error::Picker(format!("input task failed: {e}")))?
        .map_err(|e| Error::Picker(e.to_string()))?;

        let question = question.trim();
        Ok((!question.is_empty()).then(|| question.to_string()))
    }
}
