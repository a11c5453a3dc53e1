//! VisionPal - voice-driven image description for visually impaired users
//!
//! This library provides the core functionality for VisionPal:
//! - Image description through a hosted vision-language model
//! - Voice input (speech capture + STT) and output (TTS + playback)
//! - Camera capture and file selection
//! - The voice command interpreter and interaction state machine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Front ends                         │
//! │     Voice mode (Daemon)   │   Describe mode          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Presenter
//! ┌────────────────────▼────────────────────────────────┐
//! │   Listen loop → Interpreter → Controller (Session)  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │  Describer  │  Speaker / Listener  │  Camera │ Picker│
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod camera;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod describer;
pub mod error;
pub mod frontend;
pub mod interpreter;
pub mod listen;
pub mod phrases;
pub mod picker;
pub mod profile;
pub mod session;
pub mod setup;
pub mod voice;

pub use camera::{FfmpegCamera, Frame, FrameSource};
pub use config::Config;
pub use controller::{Collaborators, Controller, Event, NullPresenter, Presenter};
pub use daemon::Daemon;
pub use describer::{Describe, DescriberClient, DescriptionRequest, DescriptionResult};
pub use error::{Error, RecognitionError, Result};
pub use interpreter::{CommandToken, interpret};
pub use profile::{Language, LanguageProfile, LanguageProfiles};
pub use session::{ImageHandle, InputMethod, Session, State};
