//! Session controller for the voice chatbot
//!
//! Single-writer pattern: every event goes through [`SessionController::reduce`],
//! which updates the session (state, dialogue history, displayed transcript)
//! and returns the effects the control loop must execute, in order.
//!
//! Turns are strictly serialized. Each turn gets a fresh [`TurnId`]; any
//! asynchronous result carrying another id is stale and dropped.

use uuid::Uuid;

use crate::completion::CompletionError;
use crate::history::{DialogueHistory, DisplayEntry, DisplayedTranscript, Message, Role};
use crate::speech::{CaptureError, RecognizerEvent};
use crate::translation::TranslationError;

/// Identifies one turn (capture through playback).
pub type TurnId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Listening {
        turn: TurnId,
    },
    AwaitingCompletion {
        turn: TurnId,
    },
    AwaitingTranslation {
        turn: TurnId,
        /// Untranslated reply, spoken if translation fails
        reply: String,
    },
}

impl State {
    pub fn turn(&self) -> Option<TurnId> {
        match self {
            State::Idle => None,
            State::Listening { turn }
            | State::AwaitingCompletion { turn }
            | State::AwaitingTranslation { turn, .. } => Some(*turn),
        }
    }

    /// A reply is pending; capture and reset are refused.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            State::AwaitingCompletion { .. } | State::AwaitingTranslation { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// User pressed the speak/stop control
    ToggleCapture,
    /// Start a new session (fresh history); only honored while idle
    ResetSession,
    /// Shut down the control loop
    Exit,
    /// Result of the audio-capture permission prompt
    PermissionResolved {
        granted: bool,
    },

    Recognizer {
        turn: TurnId,
        event: RecognizerEvent,
    },

    CompletionOk {
        turn: TurnId,
        text: String,
    },
    CompletionFail {
        turn: TurnId,
        err: CompletionError,
    },

    TranslationOk {
        turn: TurnId,
        text: String,
    },
    TranslationFail {
        turn: TurnId,
        err: TranslationError,
    },
}

/// Effects to be executed after a transition.
#[derive(Debug, Clone)]
pub enum Effect {
    StartListening {
        turn: TurnId,
    },
    StopListening {
        turn: TurnId,
    },
    RequestCompletion {
        turn: TurnId,
        messages: Vec<Message>,
    },
    RequestTranslation {
        turn: TurnId,
        text: String,
    },
    Speak {
        turn: TurnId,
        text: String,
    },
    RequestPermission,
    Notify(Notice),
    /// A bubble was appended to the displayed transcript
    ShowEntry(DisplayEntry),
    /// Signal to publish the UI state
    EmitUi,
}

/// Transient, user-visible notices (toasts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Listening,
    PermissionRequired,
    Busy,
    CaptureFailed(CaptureError),
    CaptureCancelled,
    CompletionFailed(CompletionError),
    TranslationFailed(TranslationError),
    SessionReset,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Listening => write!(f, "Listening..."),
            Notice::PermissionRequired => {
                write!(f, "Permission required to use speech recognition")
            }
            Notice::Busy => write!(f, "Please wait for the current reply"),
            Notice::CaptureFailed(e) => write!(f, "Speech recognition error: {}", e),
            Notice::CaptureCancelled => write!(f, "Listening cancelled"),
            Notice::CompletionFailed(e) => write!(f, "Couldn't get a reply: {}", e),
            Notice::TranslationFailed(e) => {
                write!(f, "{}; speaking the untranslated reply", e)
            }
            Notice::SessionReset => write!(f, "Started a new conversation"),
        }
    }
}

pub struct SessionController {
    state: State,
    history: DialogueHistory,
    transcript: DisplayedTranscript,
    capture_available: bool,
    translation_enabled: bool,
}

impl SessionController {
    pub fn new(persona: impl Into<String>, translation_enabled: bool) -> Self {
        Self {
            state: State::Idle,
            history: DialogueHistory::new(persona),
            transcript: DisplayedTranscript::new(),
            capture_available: true,
            translation_enabled,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn history(&self) -> &DialogueHistory {
        &self.history
    }

    pub fn transcript(&self) -> &DisplayedTranscript {
        &self.transcript
    }

    pub fn capture_available(&self) -> bool {
        self.capture_available
    }

    pub fn translation_enabled(&self) -> bool {
        self.translation_enabled
    }

    /// Apply one event.
    ///
    /// Rules:
    /// - Only the controller mutates history and transcript
    /// - Events tagged with a turn other than the one in flight are dropped
    /// - EmitUi follows every state change
    pub fn reduce(&mut self, event: Event) -> Vec<Effect> {
        use Effect::*;

        let state = self.state.clone();
        match (state, event) {
            (_, Event::Exit) => vec![],

            (_, Event::PermissionResolved { granted }) => {
                self.capture_available = granted;
                if granted {
                    log::info!("Audio capture permission granted");
                    vec![EmitUi]
                } else {
                    log::warn!("Audio capture permission denied");
                    vec![Notify(Notice::PermissionRequired), EmitUi]
                }
            }

            // -----------------
            // Capture toggle
            // -----------------
            (State::Idle, Event::ToggleCapture) if !self.capture_available => {
                vec![Notify(Notice::PermissionRequired), RequestPermission]
            }
            (State::Idle, Event::ToggleCapture) => {
                let turn = Uuid::new_v4();
                self.state = State::Listening { turn };
                vec![StartListening { turn }, EmitUi]
            }
            // Stop is advisory: we are idle now whatever the recognizer does
            (State::Listening { turn }, Event::ToggleCapture) => {
                self.state = State::Idle;
                vec![StopListening { turn }, EmitUi]
            }
            (state, Event::ToggleCapture) if state.is_busy() => {
                if let Some(turn) = state.turn() {
                    log::info!("Capture refused: turn {} still awaiting a reply", turn);
                }
                vec![Notify(Notice::Busy)]
            }

            // -----------------
            // Session reset
            // -----------------
            (State::Idle, Event::ResetSession) => {
                let persona = self.history.persona().to_string();
                self.history = DialogueHistory::new(persona);
                self.transcript = DisplayedTranscript::new();
                log::info!("Session reset");
                vec![Notify(Notice::SessionReset), EmitUi]
            }
            (_, Event::ResetSession) => vec![Notify(Notice::Busy)],

            // -----------------
            // Listening
            // -----------------
            (State::Listening { turn }, Event::Recognizer { turn: id, event }) if turn == id => {
                self.on_recognizer(turn, event)
            }

            // -----------------
            // AwaitingCompletion
            // -----------------
            (State::AwaitingCompletion { turn }, Event::CompletionOk { turn: id, text })
                if turn == id =>
            {
                self.history.append(Role::Assistant, text.clone());
                if self.translation_enabled {
                    self.state = State::AwaitingTranslation {
                        turn,
                        reply: text.clone(),
                    };
                    vec![RequestTranslation { turn, text }, EmitUi]
                } else {
                    self.finish_turn(turn, text)
                }
            }
            // The user message stays in history without a reply
            (State::AwaitingCompletion { turn }, Event::CompletionFail { turn: id, err })
                if turn == id =>
            {
                log::warn!("Turn {} failed: {}", turn, err);
                self.state = State::Idle;
                vec![Notify(Notice::CompletionFailed(err)), EmitUi]
            }

            // -----------------
            // AwaitingTranslation
            // -----------------
            (State::AwaitingTranslation { turn, .. }, Event::TranslationOk { turn: id, text })
                if turn == id =>
            {
                self.finish_turn(turn, text)
            }
            (
                State::AwaitingTranslation { turn, reply },
                Event::TranslationFail { turn: id, err },
            ) if turn == id => {
                log::warn!("Translation for turn {} failed: {}", turn, err);
                let mut effects = vec![Notify(Notice::TranslationFailed(err))];
                effects.extend(self.finish_turn(turn, reply));
                effects
            }

            // -----------------
            // Stale or unexpected events (drop silently)
            // -----------------
            (state, event) => {
                log::debug!("Dropping {:?} in state {:?}", event, state);
                vec![]
            }
        }
    }

    fn on_recognizer(&mut self, turn: TurnId, event: RecognizerEvent) -> Vec<Effect> {
        use Effect::*;

        match event {
            RecognizerEvent::Ready => vec![Notify(Notice::Listening)],
            RecognizerEvent::EndOfSpeech => {
                log::debug!("End of speech for turn {}", turn);
                vec![]
            }
            RecognizerEvent::Final(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    self.state = State::Idle;
                    return vec![Notify(Notice::CaptureFailed(CaptureError::NoMatch)), EmitUi];
                }

                log::info!("Recognized text for turn {}: {} chars", turn, text.len());
                self.history.append(Role::User, text.clone());
                let entry = DisplayEntry::user(text);
                self.transcript.push(entry.clone());
                self.state = State::AwaitingCompletion { turn };
                vec![
                    ShowEntry(entry),
                    RequestCompletion {
                        turn,
                        messages: self.history.snapshot(),
                    },
                    EmitUi,
                ]
            }
            RecognizerEvent::Error(err) => {
                if err == CaptureError::PermissionDenied {
                    self.capture_available = false;
                }
                self.state = State::Idle;
                vec![Notify(Notice::CaptureFailed(err)), EmitUi]
            }
            RecognizerEvent::Cancelled => {
                self.state = State::Idle;
                vec![Notify(Notice::CaptureCancelled), EmitUi]
            }
        }
    }

    /// Show and speak the final text of a turn, then go idle.
    fn finish_turn(&mut self, turn: TurnId, text: String) -> Vec<Effect> {
        let entry = DisplayEntry::assistant(text.clone());
        self.transcript.push(entry.clone());
        self.state = State::Idle;
        vec![
            Effect::ShowEntry(entry),
            Effect::Speak { turn, text },
            Effect::EmitUi,
        ]
    }
}
