//! One-shot dictation: capture a single utterance and return its transcript.
//!
//! No history, completion or playback is involved.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::speech::{CaptureError, LanguageHints, RecognizerEvent, RecognizerListener, TranscriptSource};

/// Capture one utterance from `source`.
///
/// Fails with `SpeechTimeout` if no terminal event arrives before `deadline`
/// and with `NoMatch` if the transcript is blank.
pub async fn dictate(
    source: Arc<dyn TranscriptSource>,
    hints: &LanguageHints,
    deadline: Duration,
) -> Result<String, CaptureError> {
    let permission_source = source.clone();
    let granted = tokio::task::spawn_blocking(move || permission_source.request_permission())
        .await
        .map_err(|e| CaptureError::Client(format!("permission task failed: {}", e)))?;
    if !granted {
        return Err(CaptureError::PermissionDenied);
    }

    let turn = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = RecognizerListener::new(turn, move |_, event| {
        let _ = tx.send(event);
    });

    source.start_listening(turn, hints, listener)?;
    log::info!("Dictation started (turn {}, {})", turn, hints);

    let outcome = tokio::time::timeout(deadline, async {
        while let Some(event) = rx.recv().await {
            match event {
                RecognizerEvent::Ready => log::debug!("Dictation: recognizer ready"),
                RecognizerEvent::EndOfSpeech => log::debug!("Dictation: end of speech"),
                RecognizerEvent::Final(text) => return Ok(text),
                RecognizerEvent::Error(err) => return Err(err),
                RecognizerEvent::Cancelled => {
                    return Err(CaptureError::Client("recognition cancelled".into()))
                }
            }
        }
        Err(CaptureError::Client("recognizer went away".into()))
    })
    .await;

    match outcome {
        Ok(Ok(text)) if text.trim().is_empty() => Err(CaptureError::NoMatch),
        Ok(Ok(text)) => Ok(text.trim().to_string()),
        Ok(Err(err)) => {
            log::warn!("Dictation failed: {}", err);
            Err(err)
        }
        Err(_) => {
            log::warn!("Dictation timed out after {:?}", deadline);
            source.stop_listening(turn);
            Err(CaptureError::SpeechTimeout)
        }
    }
}
