//! Terminal stand-in for the platform recognizer
//!
//! While armed, the next line typed on the console is treated as the final
//! transcript of the activation.

use std::sync::Mutex;

use super::{CaptureError, LanguageHints, RecognizerEvent, RecognizerListener, TranscriptSource};
use crate::state_machine::TurnId;

#[derive(Debug, Default)]
pub struct ConsoleRecognizer {
    armed: Mutex<Option<RecognizerListener>>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.armed.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Hand a typed line to the armed activation.
    /// Returns false if nothing is listening.
    pub fn offer_line(&self, line: &str) -> bool {
        let listener = match self.armed.lock() {
            Ok(mut armed) => armed.take(),
            Err(_) => None,
        };

        match listener {
            Some(listener) => {
                listener.deliver(RecognizerEvent::EndOfSpeech);
                listener.deliver(RecognizerEvent::Final(line.trim().to_string()));
                true
            }
            None => false,
        }
    }
}

impl TranscriptSource for ConsoleRecognizer {
    fn start_listening(
        &self,
        turn: TurnId,
        hints: &LanguageHints,
        listener: RecognizerListener,
    ) -> Result<(), CaptureError> {
        let mut armed = self
            .armed
            .lock()
            .map_err(|_| CaptureError::Client("console recognizer lock poisoned".into()))?;
        if armed.is_some() {
            return Err(CaptureError::RecognizerBusy);
        }

        log::info!("Console recognizer armed for turn {} [{}]", turn, hints);
        listener.deliver(RecognizerEvent::Ready);
        *armed = Some(listener);
        Ok(())
    }

    fn stop_listening(&self, turn: TurnId) {
        if let Ok(mut armed) = self.armed.lock() {
            if armed.as_ref().map(|l| l.turn()) == Some(turn) {
                log::info!("Console recognizer disarmed for turn {}", turn);
                *armed = None;
            }
        }
    }
}
