//! Speech capture and playback contracts
//!
//! The recognizer and the synthesizer are platform collaborators. The session
//! only sees them through [`TranscriptSource`] and [`PlaybackSink`]; recognizer
//! callbacks arrive as a closed set of [`RecognizerEvent`]s pushed into the
//! control loop's channel, never as direct state mutation.

mod command;
mod console;

pub use command::CommandSynthesizer;
pub use console::ConsoleRecognizer;

use std::sync::Arc;

use crate::state_machine::TurnId;

/// Errors reported by a listening activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    PermissionDenied,
    NoMatch,
    SpeechTimeout,
    RecognizerBusy,
    Network,
    NetworkTimeout,
    Audio,
    Server,
    LanguageUnavailable,
    LanguageNotSupported,
    Client(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(f, "Insufficient permissions"),
            CaptureError::NoMatch => write!(f, "No match found"),
            CaptureError::SpeechTimeout => write!(f, "No speech input"),
            CaptureError::RecognizerBusy => write!(f, "Speech recognizer is busy"),
            CaptureError::Network => write!(f, "Network error"),
            CaptureError::NetworkTimeout => write!(f, "Network timeout"),
            CaptureError::Audio => write!(f, "Audio recording error"),
            CaptureError::Server => write!(f, "Server error"),
            CaptureError::LanguageUnavailable => write!(f, "Language unavailable"),
            CaptureError::LanguageNotSupported => write!(f, "Language not supported"),
            CaptureError::Client(e) => write!(f, "Client-side error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Recognizer callbacks, one variant per listener hook we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Microphone is open
    Ready,
    /// User stopped talking; a terminal event follows
    EndOfSpeech,
    /// Terminal: final transcript
    Final(String),
    /// Terminal: recognition failed
    Error(CaptureError),
    /// Terminal: the recognizer confirmed cancellation
    Cancelled,
}

impl RecognizerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecognizerEvent::Final(_) | RecognizerEvent::Error(_) | RecognizerEvent::Cancelled
        )
    }
}

/// Language preferences for one listening activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageHints {
    pub primary: String,
    pub fallback: Option<String>,
}

impl std::fmt::Display for LanguageHints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fallback {
            Some(fallback) => write!(f, "{} (fallback {})", self.primary, fallback),
            None => write!(f, "{}", self.primary),
        }
    }
}

/// Callback handed to the recognizer for one activation.
///
/// Tagged with the turn it was issued for so late deliveries can be matched
/// against the turn in flight.
#[derive(Clone)]
pub struct RecognizerListener {
    turn: TurnId,
    deliver: Arc<dyn Fn(TurnId, RecognizerEvent) + Send + Sync>,
}

impl RecognizerListener {
    pub fn new(
        turn: TurnId,
        deliver: impl Fn(TurnId, RecognizerEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            turn,
            deliver: Arc::new(deliver),
        }
    }

    pub fn turn(&self) -> TurnId {
        self.turn
    }

    pub fn deliver(&self, event: RecognizerEvent) {
        if event.is_terminal() {
            log::info!("Recognizer finished turn {}: {:?}", self.turn, event);
        } else {
            log::debug!("Recognizer event for turn {}: {:?}", self.turn, event);
        }
        (self.deliver)(self.turn, event);
    }
}

impl std::fmt::Debug for RecognizerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerListener")
            .field("turn", &self.turn)
            .finish_non_exhaustive()
    }
}

/// Platform speech recognizer.
///
/// After a successful `start_listening`, exactly one terminal event is
/// delivered unless `stop_listening` is called first, in which case delivery
/// is best-effort. Callers must not start a second activation while one is
/// running.
pub trait TranscriptSource: Send + Sync + 'static {
    /// Ask for audio-capture permission. Returns whether it is granted.
    fn request_permission(&self) -> bool {
        true
    }

    fn start_listening(
        &self,
        turn: TurnId,
        hints: &LanguageHints,
        listener: RecognizerListener,
    ) -> Result<(), CaptureError>;

    fn stop_listening(&self, turn: TurnId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Synthesizer could not be initialized; playback degrades to text only
    Unavailable(String),
    /// A single utterance failed to start
    Failed(String),
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::Unavailable(e) => write!(f, "Text-to-speech unavailable: {}", e),
            PlaybackError::Failed(e) => write!(f, "Text-to-speech failed: {}", e),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Platform speech synthesizer.
///
/// `speak` always interrupts the utterance in progress before starting the
/// new one (queue depth 1, last write wins). Completion is not reported.
pub trait PlaybackSink: Send + Sync + 'static {
    fn speak(&self, text: &str, language: &str) -> Result<(), PlaybackError>;
}

/// Playback used when no synthesizer is available: the text is already on
/// screen, so speaking is a logged no-op.
#[derive(Debug, Default)]
pub struct TextOnlySink;

impl PlaybackSink for TextOnlySink {
    fn speak(&self, text: &str, language: &str) -> Result<(), PlaybackError> {
        log::debug!(
            "Text-only playback ({}): {} chars not spoken",
            language,
            text.chars().count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[test]
    fn terminal_events_are_final_error_and_cancelled() {
        assert!(RecognizerEvent::Final("hi".into()).is_terminal());
        assert!(RecognizerEvent::Error(CaptureError::NoMatch).is_terminal());
        assert!(RecognizerEvent::Cancelled.is_terminal());
        assert!(!RecognizerEvent::Ready.is_terminal());
        assert!(!RecognizerEvent::EndOfSpeech.is_terminal());
    }

    #[test]
    fn listener_tags_events_with_its_turn() {
        let turn = Uuid::new_v4();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = RecognizerListener::new(turn, move |t, e| {
            sink.lock().unwrap().push((t, e));
        });

        listener.deliver(RecognizerEvent::Ready);
        listener.deliver(RecognizerEvent::Final("hello".into()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(t, _)| *t == turn));
        assert_eq!(seen[1].1, RecognizerEvent::Final("hello".into()));
    }

    #[test]
    fn capture_errors_read_as_short_notices() {
        assert_eq!(CaptureError::NoMatch.to_string(), "No match found");
        assert_eq!(
            CaptureError::RecognizerBusy.to_string(),
            "Speech recognizer is busy"
        );
        assert!(CaptureError::Client("boom".into()).to_string().contains("boom"));
    }

    #[test]
    fn language_hints_display_includes_fallback() {
        let hints = LanguageHints {
            primary: "si-LK".into(),
            fallback: Some("en-HI".into()),
        };
        assert_eq!(hints.to_string(), "si-LK (fallback en-HI)");
    }
}
