//! The single live interaction context

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempPath;

use crate::profile::Language;

/// Interaction state of the voice flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Idle, waiting for "start"
    #[default]
    WaitingForStart,
    LanguageSelection,
    InputMethodSelection,
    /// Camera open, waiting for "capture"
    Capturing,
    /// Description requested or being spoken
    Processing,
}

impl State {
    /// Every state, in flow order
    pub const ALL: [Self; 5] = [
        Self::WaitingForStart,
        Self::LanguageSelection,
        Self::InputMethodSelection,
        Self::Capturing,
        Self::Processing,
    ];
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitingForStart => "waiting_for_start",
            Self::LanguageSelection => "language_selection",
            Self::InputMethodSelection => "input_method",
            Self::Capturing => "capturing",
            Self::Processing => "processing",
        };
        f.write_str(name)
    }
}

/// How the image is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMethod {
    Camera,
    Gallery,
}

/// Handle to the image being described
///
/// Captured frames live in a temporary file that is removed when the last
/// clone of the handle is dropped. Selected files are never removed.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    path: PathBuf,
    temp: Option<Arc<TempPath>>,
}

impl ImageHandle {
    /// Handle to a user-selected file
    #[must_use]
    pub const fn selected(path: PathBuf) -> Self {
        Self { path, temp: None }
    }

    /// Handle owning a temporary capture file
    #[must_use]
    pub fn captured(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            temp: Some(Arc::new(temp)),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is a temporary capture
    #[must_use]
    pub const fn is_captured(&self) -> bool {
        self.temp.is_some()
    }
}

/// Mutable interaction context, owned by the controller
#[derive(Debug, Default)]
pub struct Session {
    pub state: State,
    pub selected_language: Option<Language>,
    pub selected_input_method: Option<InputMethod>,
    pub current_image: Option<ImageHandle>,
    pub is_playing_audio: bool,
    generation: u64,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request generation; bumped on every reset
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Return to idle, clearing the selection fields
    ///
    /// Playback status is left alone: audio that is still playing keeps
    /// playing across a reset and can still be stopped.
    pub fn reset(&mut self) {
        self.state = State::WaitingForStart;
        self.selected_language = None;
        self.selected_input_method = None;
        self.current_image = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether the session is back at its idle defaults
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, State::WaitingForStart)
            && self.selected_language.is_none()
            && self.selected_input_method.is_none()
            && self.current_image.is_none()
    }
}
