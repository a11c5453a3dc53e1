//! Voice command interpretation
//!
//! Maps recognized utterances to command tokens by keyword containment.
//! Matching is deliberately permissive ("captured" matches "capture") to
//! tolerate noisy transcriptions. Within a state the keyword table is
//! scanned in order and the earliest entry that matches wins.

use crate::session::State;

/// Abstract intent derived from an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandToken {
    Start,
    LangEn,
    LangAr,
    InputCamera,
    InputGallery,
    Capture,
    Stop,
    Unrecognized,
}

/// Keywords that stop playback, recognized in every state
const STOP_KEYWORDS: &[&str] = &["stop", "توقف"];

const WAITING_VOCABULARY: &[(&str, CommandToken)] = &[("start", CommandToken::Start)];

const LANGUAGE_VOCABULARY: &[(&str, CommandToken)] = &[
    ("english", CommandToken::LangEn),
    ("arabic", CommandToken::LangAr),
];

const INPUT_VOCABULARY: &[(&str, CommandToken)] = &[
    ("camera", CommandToken::InputCamera),
    ("كاميرا", CommandToken::InputCamera),
    ("gallery", CommandToken::InputGallery),
    ("معرض", CommandToken::InputGallery),
];

const CAPTURE_VOCABULARY: &[(&str, CommandToken)] = &[
    ("capture", CommandToken::Capture),
    ("التقط", CommandToken::Capture),
];

/// Keyword table for a state, in priority order
#[must_use]
pub const fn vocabulary(state: State) -> &'static [(&'static str, CommandToken)] {
    match state {
        State::WaitingForStart => WAITING_VOCABULARY,
        State::LanguageSelection => LANGUAGE_VOCABULARY,
        State::InputMethodSelection => INPUT_VOCABULARY,
        State::Capturing => CAPTURE_VOCABULARY,
        State::Processing => &[],
    }
}

/// Lower-case and trim an utterance
#[must_use]
pub fn normalize(utterance: &str) -> String {
    utterance.trim().to_lowercase()
}

/// Whether the utterance asks to stop playback
#[must_use]
pub fn is_stop_request(utterance: &str) -> bool {
    let normalized = normalize(utterance);
    STOP_KEYWORDS.iter().any(|k| normalized.contains(k))
}

/// Interpret an utterance in the given state
///
/// STOP wins over everything else while audio is playing. When nothing is
/// playing, stop keywords carry no meaning and the state vocabulary decides.
#[must_use]
pub fn interpret(utterance: &str, state: State, playing: bool) -> CommandToken {
    let normalized = normalize(utterance);

    if playing && STOP_KEYWORDS.iter().any(|k| normalized.contains(k)) {
        return CommandToken::Stop;
    }

    vocabulary(state)
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
        .map_or(CommandToken::Unrecognized, |&(keyword, token)| {
            tracing::debug!(keyword, %state, ?token, "keyword matched");
            token
        })
}
