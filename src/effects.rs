//! Effect runner for the voice chatbot
//!
//! Executes the effects produced by the session controller. Remote calls run
//! on spawned tasks under a deadline; their outcomes come back to the control
//! loop as events tagged with the turn they belong to.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::completion::{CompletionClient, CompletionError};
use crate::metrics::MetricsCollector;
use crate::settings::AppSettings;
use crate::speech::{
    CaptureError, LanguageHints, PlaybackSink, RecognizerEvent, RecognizerListener, TranscriptSource,
};
use crate::state_machine::{Effect, Event};
use crate::translation::{TranslationError, Translator};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// The platform and remote services a chat session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn TranscriptSource>,
    pub completion: Arc<dyn CompletionClient>,
    /// None disables the translation stage
    pub translator: Option<Arc<dyn Translator>>,
    pub playback: Arc<dyn PlaybackSink>,
}

/// How a recognizer event ends the turn's capture, as far as metrics care.
enum CaptureOutcome {
    Failed(String),
    Cancelled,
}

impl CaptureOutcome {
    fn of(event: &RecognizerEvent) -> Option<Self> {
        match event {
            RecognizerEvent::Error(err) => Some(CaptureOutcome::Failed(err.to_string())),
            RecognizerEvent::Final(text) if text.trim().is_empty() => {
                Some(CaptureOutcome::Failed(CaptureError::NoMatch.to_string()))
            }
            RecognizerEvent::Cancelled => Some(CaptureOutcome::Cancelled),
            _ => None,
        }
    }
}

pub struct ChatEffectRunner {
    collaborators: Collaborators,
    hints: LanguageHints,
    synthesis_language: String,
    translate_from: String,
    translate_to: String,
    completion_timeout: Duration,
    translation_timeout: Duration,
    metrics: Arc<Mutex<MetricsCollector>>,
}

impl ChatEffectRunner {
    pub fn new(
        collaborators: Collaborators,
        settings: &AppSettings,
        metrics: Arc<Mutex<MetricsCollector>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            collaborators,
            hints: settings.language_hints(),
            synthesis_language: settings.speech.synthesis_language.clone(),
            translate_from: settings.translation.from.clone(),
            translate_to: settings.translation.to.clone(),
            completion_timeout: settings.completion_timeout(),
            translation_timeout: settings.translation_timeout(),
            metrics,
        })
    }
}

impl EffectRunner for ChatEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartListening { turn } => {
                let metrics = self.metrics.clone();
                let runtime = tokio::runtime::Handle::current();

                // Recognizer callbacks may fire on any thread; they only ever
                // enqueue an event for the control loop.
                let events = tx.clone();
                let listener = RecognizerListener::new(turn, move |turn, event| {
                    if let Some(outcome) = CaptureOutcome::of(&event) {
                        let metrics = metrics.clone();
                        runtime.spawn(async move {
                            let mut m = metrics.lock().await;
                            match outcome {
                                CaptureOutcome::Failed(message) => {
                                    m.turn_failed(turn, "capture", message)
                                }
                                CaptureOutcome::Cancelled => m.turn_cancelled(turn),
                            }
                        });
                    }

                    match events.try_send(Event::Recognizer { turn, event }) {
                        Ok(()) => {}
                        // Terminal events must not be lost; wait for room.
                        Err(mpsc::error::TrySendError::Full(event)) => {
                            log::debug!("Control channel full; queueing recognizer event");
                            let events = events.clone();
                            runtime.spawn(async move {
                                if events.send(event).await.is_err() {
                                    log::error!("Session loop gone; recognizer event dropped");
                                }
                            });
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            log::error!("Session loop gone; recognizer event dropped");
                        }
                    }
                });

                let metrics = self.metrics.clone();
                tokio::spawn(async move {
                    metrics.lock().await.start_turn(turn);
                });

                if let Err(err) = self
                    .collaborators
                    .source
                    .start_listening(turn, &self.hints, listener)
                {
                    log::error!("Failed to start listening for turn {}: {}", turn, err);
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        metrics
                            .lock()
                            .await
                            .turn_failed(turn, "capture", err.to_string());
                        let _ = tx
                            .send(Event::Recognizer {
                                turn,
                                event: RecognizerEvent::Error(err),
                            })
                            .await;
                    });
                }
            }

            Effect::StopListening { turn } => {
                self.collaborators.source.stop_listening(turn);
                let metrics = self.metrics.clone();
                tokio::spawn(async move {
                    metrics.lock().await.turn_cancelled(turn);
                });
            }

            Effect::RequestCompletion { turn, messages } => {
                let client = self.collaborators.completion.clone();
                let metrics = self.metrics.clone();
                let deadline = self.completion_timeout;

                tokio::spawn(async move {
                    metrics.lock().await.completion_started(turn);

                    let result = match tokio::time::timeout(deadline, client.complete(&messages))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            log::warn!("Completion for turn {} timed out after {:?}", turn, deadline);
                            Err(CompletionError::Timeout)
                        }
                    };

                    let event = match result {
                        Ok(text) => {
                            metrics
                                .lock()
                                .await
                                .completion_finished(turn, text.chars().count());
                            Event::CompletionOk { turn, text }
                        }
                        Err(err) => {
                            metrics
                                .lock()
                                .await
                                .turn_failed(turn, "completion", err.to_string());
                            Event::CompletionFail { turn, err }
                        }
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::RequestTranslation { turn, text } => {
                let Some(translator) = self.collaborators.translator.clone() else {
                    log::warn!("Translation requested for turn {} but no translator is configured", turn);
                    tokio::spawn(async move {
                        let _ = tx
                            .send(Event::TranslationFail {
                                turn,
                                err: TranslationError::Network(
                                    "translator not configured".to_string(),
                                ),
                            })
                            .await;
                    });
                    return;
                };

                let metrics = self.metrics.clone();
                let deadline = self.translation_timeout;
                let from = self.translate_from.clone();
                let to = self.translate_to.clone();

                tokio::spawn(async move {
                    metrics.lock().await.translation_started(turn);

                    let result = match tokio::time::timeout(
                        deadline,
                        translator.translate(&text, &from, &to),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(TranslationError::Network(format!(
                            "timed out after {}s",
                            deadline.as_secs()
                        ))),
                    };

                    let event = {
                        let mut m = metrics.lock().await;
                        m.translation_finished(turn);
                        match result {
                            Ok(text) => Event::TranslationOk { turn, text },
                            Err(err) => {
                                m.record_error(
                                    "translation",
                                    err.to_string(),
                                    Some(turn.to_string()),
                                );
                                Event::TranslationFail { turn, err }
                            }
                        }
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::Speak { turn, text } => {
                if let Err(e) = self
                    .collaborators
                    .playback
                    .speak(&text, &self.synthesis_language)
                {
                    log::warn!("Playback failed for turn {}: {}", turn, e);
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        metrics
                            .lock()
                            .await
                            .record_error("playback", e.to_string(), Some(turn.to_string()));
                    });
                }
                let metrics = self.metrics.clone();
                tokio::spawn(async move {
                    metrics.lock().await.turn_completed(turn);
                });
            }

            Effect::RequestPermission => {
                let source = self.collaborators.source.clone();
                tokio::spawn(async move {
                    let granted = match tokio::task::spawn_blocking(move || {
                        source.request_permission()
                    })
                    .await
                    {
                        Ok(granted) => granted,
                        Err(e) => {
                            log::error!("Permission request task failed: {}", e);
                            false
                        }
                    };
                    let _ = tx.send(Event::PermissionResolved { granted }).await;
                });
            }

            Effect::Notify(_) | Effect::ShowEntry(_) | Effect::EmitUi => {
                log::debug!("UI effect reached the runner; the control loop handles these");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Message;
    use crate::speech::PlaybackError;
    use crate::state_machine::TurnId;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    struct SilentSource;

    impl TranscriptSource for SilentSource {
        fn start_listening(
            &self,
            _turn: TurnId,
            _hints: &LanguageHints,
            _listener: RecognizerListener,
        ) -> Result<(), CaptureError> {
            Err(CaptureError::RecognizerBusy)
        }

        fn stop_listening(&self, _turn: TurnId) {}

        fn request_permission(&self) -> bool {
            false
        }
    }

    struct SlowCompletion;

    #[async_trait]
    impl CompletionClient for SlowCompletion {
        async fn complete(&self, _history: &[Message]) -> Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too slow".into())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        spoken: StdMutex<Vec<(String, String)>>,
    }

    impl PlaybackSink for RecordingSink {
        fn speak(&self, text: &str, language: &str) -> Result<(), PlaybackError> {
            self.spoken
                .lock()
                .unwrap()
                .push((text.to_string(), language.to_string()));
            Ok(())
        }
    }

    /// Delivers a fixed sequence of events as soon as it is started.
    struct ScriptedSource {
        events: Vec<RecognizerEvent>,
    }

    impl TranscriptSource for ScriptedSource {
        fn start_listening(
            &self,
            _turn: TurnId,
            _hints: &LanguageHints,
            listener: RecognizerListener,
        ) -> Result<(), CaptureError> {
            for event in &self.events {
                listener.deliver(event.clone());
            }
            Ok(())
        }

        fn stop_listening(&self, _turn: TurnId) {}
    }

    fn scripted_runner(
        events: Vec<RecognizerEvent>,
    ) -> (Arc<ChatEffectRunner>, Arc<Mutex<MetricsCollector>>) {
        let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
        let runner = ChatEffectRunner::new(
            Collaborators {
                source: Arc::new(ScriptedSource { events }),
                completion: Arc::new(SlowCompletion),
                translator: None,
                playback: Arc::new(RecordingSink::default()),
            },
            &AppSettings::default(),
            metrics.clone(),
        );
        (runner, metrics)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn runner(sink: Arc<RecordingSink>) -> Arc<ChatEffectRunner> {
        let mut settings = AppSettings::default();
        settings.completion.timeout_secs = 1;
        ChatEffectRunner::new(
            Collaborators {
                source: Arc::new(SilentSource),
                completion: Arc::new(SlowCompletion),
                translator: None,
                playback: sink,
            },
            &settings,
            Arc::new(Mutex::new(MetricsCollector::new())),
        )
    }

    #[tokio::test]
    async fn completion_past_deadline_reports_timeout() {
        let runner = runner(Arc::new(RecordingSink::default()));
        let (tx, mut rx) = mpsc::channel(8);
        let turn = Uuid::new_v4();

        runner.spawn(
            Effect::RequestCompletion {
                turn,
                messages: vec![Message::system("p"), Message::user("hi")],
            },
            tx,
        );

        match rx.recv().await {
            Some(Event::CompletionFail { turn: t, err }) => {
                assert_eq!(t, turn);
                assert_eq!(err, CompletionError::Timeout);
            }
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn recognizer_start_failure_comes_back_as_capture_error() {
        let runner = runner(Arc::new(RecordingSink::default()));
        let (tx, mut rx) = mpsc::channel(8);
        let turn = Uuid::new_v4();

        runner.spawn(Effect::StartListening { turn }, tx);

        match rx.recv().await {
            Some(Event::Recognizer { turn: t, event }) => {
                assert_eq!(t, turn);
                assert_eq!(event, RecognizerEvent::Error(CaptureError::RecognizerBusy));
            }
            other => panic!("expected recognizer error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_translator_fails_translation() {
        let runner = runner(Arc::new(RecordingSink::default()));
        let (tx, mut rx) = mpsc::channel(8);
        let turn = Uuid::new_v4();

        runner.spawn(
            Effect::RequestTranslation {
                turn,
                text: "hi".into(),
            },
            tx,
        );

        assert!(matches!(
            rx.recv().await,
            Some(Event::TranslationFail { turn: t, .. }) if t == turn
        ));
    }

    #[tokio::test]
    async fn speak_uses_synthesis_language() {
        let sink = Arc::new(RecordingSink::default());
        let runner = runner(sink.clone());
        let (tx, _rx) = mpsc::channel(8);

        runner.spawn(
            Effect::Speak {
                turn: Uuid::new_v4(),
                text: "hello".into(),
            },
            tx,
        );

        assert_eq!(
            *sink.spoken.lock().unwrap(),
            vec![("hello".to_string(), "si-LK".to_string())]
        );
    }

    #[tokio::test]
    async fn permission_result_is_reported() {
        let runner = runner(Arc::new(RecordingSink::default()));
        let (tx, mut rx) = mpsc::channel(8);

        runner.spawn(Effect::RequestPermission, tx);

        assert!(matches!(
            rx.recv().await,
            Some(Event::PermissionResolved { granted: false })
        ));
    }

    #[tokio::test]
    async fn blank_transcript_closes_the_turn_as_a_capture_failure() {
        let (runner, metrics) = scripted_runner(vec![RecognizerEvent::Final("   ".into())]);
        let (tx, mut rx) = mpsc::channel(8);
        let turn = Uuid::new_v4();

        runner.spawn(Effect::StartListening { turn }, tx);
        assert!(matches!(rx.recv().await, Some(Event::Recognizer { .. })));
        settle().await;

        let m = metrics.lock().await;
        assert!(!m.is_active_turn(turn));
        let summary = m.get_summary();
        assert_eq!(summary.total_turns, 1);
        assert_eq!(summary.failed_turns, 1);
        assert_eq!(summary.last_error.unwrap().error_type, "capture");
    }

    #[tokio::test]
    async fn recognizer_cancellation_drops_the_turn() {
        let (runner, metrics) = scripted_runner(vec![RecognizerEvent::Cancelled]);
        let (tx, mut rx) = mpsc::channel(8);
        let turn = Uuid::new_v4();

        runner.spawn(Effect::StartListening { turn }, tx);
        assert!(matches!(
            rx.recv().await,
            Some(Event::Recognizer { event: RecognizerEvent::Cancelled, .. })
        ));
        settle().await;

        let m = metrics.lock().await;
        assert!(!m.is_active_turn(turn));
        assert_eq!(m.get_summary().total_turns, 0);
    }

    #[tokio::test]
    async fn final_transcript_survives_a_full_control_channel() {
        let (runner, _metrics) = scripted_runner(vec![RecognizerEvent::Final("hello".into())]);
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(Event::ToggleCapture).unwrap();
        let turn = Uuid::new_v4();

        runner.spawn(Effect::StartListening { turn }, tx);

        assert!(matches!(rx.recv().await, Some(Event::ToggleCapture)));
        match rx.recv().await {
            Some(Event::Recognizer { turn: t, event }) => {
                assert_eq!(t, turn);
                assert_eq!(event, RecognizerEvent::Final("hello".into()));
            }
            other => panic!("expected final transcript, got {:?}", other),
        }
    }
}
