//! Terminal front end
//!
//! Enter is the speak/stop control. While listening, the next typed line is
//! the recognized utterance. Slash commands manage the session.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::completion::{AzureOpenAiClient, CompletionClient};
use crate::credentials::{get_api_key, ApiService};
use crate::dictation::dictate;
use crate::effects::Collaborators;
use crate::history::DisplayEntry;
use crate::metrics::MetricsSummary;
use crate::read_aloud::read_aloud;
use crate::settings::AppSettings;
use crate::speech::{CommandSynthesizer, ConsoleRecognizer, PlaybackSink, TextOnlySink};
use crate::state_machine::{Event, Notice};
use crate::translation::{AzureTranslator, Translator};
use crate::{start_session, UiSink, UiState};

const HELP: &str = "\
  <Enter>        start listening / stop listening
  <text>         while listening: what you said
  /reset         start a new conversation
  /stats         show turn statistics
  /help          show this help
  /quit          leave";

/// Prints session output to stdout.
pub struct ConsoleUi;

impl UiSink for ConsoleUi {
    fn state_changed(&self, state: UiState) {
        match state {
            UiState::Idle => println!("[press Enter to speak]"),
            UiState::Listening => {}
            UiState::Thinking => println!("(thinking...)"),
            UiState::Translating => println!("(translating...)"),
        }
    }

    fn entry_added(&self, entry: &DisplayEntry) {
        let who = if entry.is_user { "You" } else { "Bot" };
        println!("{} [{}]: {}", who, entry.at.format("%H:%M:%S"), entry.text);
    }

    fn notice(&self, notice: &Notice) {
        println!("* {}", notice);
    }
}

/// Forward stdin lines until EOF or cancellation.
fn spawn_stdin_lines(cancel: CancellationToken) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                },
            }
        }
        log::debug!("Stdin reader stopped");
    });
    rx
}

fn missing_key_message(service: ApiService) -> String {
    format!(
        "No {} API key configured. Set {} or run `voicebot keys set {}`",
        service.label(),
        service.env_var(),
        service.label()
    )
}

fn build_playback(settings: &AppSettings) -> (Arc<dyn PlaybackSink>, Option<Arc<CommandSynthesizer>>) {
    match CommandSynthesizer::new(settings.speech.synthesizer_command.clone()) {
        Ok(synth) => {
            let synth = Arc::new(synth);
            (synth.clone(), Some(synth))
        }
        Err(e) => {
            log::warn!("{}; replies will be shown but not spoken", e);
            (Arc::new(TextOnlySink), None)
        }
    }
}

fn build_translator(settings: &AppSettings) -> Result<Option<Arc<dyn Translator>>, String> {
    if !settings.translation.enabled {
        return Ok(None);
    }
    let Some(key) = get_api_key(ApiService::Translation) else {
        log::warn!(
            "{}; translation disabled for this session",
            missing_key_message(ApiService::Translation)
        );
        return Ok(None);
    };
    let translator =
        AzureTranslator::new(&settings.translation, key, settings.translation_timeout())
            .map_err(|e| e.to_string())?;
    Ok(Some(Arc::new(translator)))
}

fn build_completion(settings: &AppSettings) -> Result<Arc<dyn CompletionClient>, String> {
    let key = get_api_key(ApiService::Completion)
        .ok_or_else(|| missing_key_message(ApiService::Completion))?;
    let client = AzureOpenAiClient::new(&settings.completion, key, settings.completion_timeout())
        .map_err(|e| e.to_string())?;
    Ok(Arc::new(client))
}

fn print_summary(summary: &MetricsSummary) {
    println!(
        "turns: {} ({} ok, {} failed)",
        summary.total_turns, summary.successful_turns, summary.failed_turns
    );
    println!(
        "avg completion: {} ms, avg translation: {} ms, avg turn: {} ms",
        summary.avg_completion_duration_ms,
        summary.avg_translation_duration_ms,
        summary.avg_total_turn_ms
    );
    if let Some(err) = &summary.last_error {
        println!("last error ({}): {}", err.error_type, err.message);
    }
}

/// Interactive voice chat on the terminal.
pub async fn run_chat(settings: &AppSettings) -> Result<(), String> {
    let problems = settings.problems();
    if !problems.is_empty() {
        return Err(format!(
            "Settings need attention: {} (see `voicebot config show`)",
            problems.join("; ")
        ));
    }

    let completion = build_completion(settings)?;
    let translator = build_translator(settings)?;
    let (playback, synthesizer) = build_playback(settings);
    let recognizer = Arc::new(ConsoleRecognizer::new());

    let collaborators = Collaborators {
        source: recognizer.clone(),
        completion,
        translator,
        playback,
    };

    println!("{}", HELP);
    let session = start_session(settings, collaborators, Arc::new(ConsoleUi));
    let handle = session.handle.clone();
    let metrics = session.metrics.clone();
    let mut task = session.task;

    let cancel = CancellationToken::new();
    let mut lines = spawn_stdin_lines(cancel.clone());
    let mut stdin_open = true;

    let result = loop {
        tokio::select! {
            finished = &mut task => break finished,

            line = lines.recv(), if stdin_open => {
                if line.is_none() {
                    stdin_open = false;
                }
                let event = match line.as_deref().map(str::trim) {
                    None | Some("/quit") | Some("/exit") => Some(Event::Exit),
                    Some("/reset") => Some(Event::ResetSession),
                    Some("/help") => {
                        println!("{}", HELP);
                        None
                    }
                    Some("/stats") => {
                        print_summary(&metrics.lock().await.get_summary());
                        None
                    }
                    Some("") => Some(Event::ToggleCapture),
                    Some(text) if recognizer.is_listening() => {
                        recognizer.offer_line(text);
                        None
                    }
                    Some(_) => {
                        println!("* Press Enter to start listening first");
                        None
                    }
                };

                if let Some(event) = event {
                    if handle.send(event).await.is_err() {
                        log::warn!("Session loop is gone");
                    }
                }
            }
        }
    };
    cancel.cancel();

    let controller = result.map_err(|e| format!("Session task failed: {}", e))?;
    log::info!(
        "Session ended with {} messages in history",
        controller.history().len()
    );
    print_summary(&metrics.lock().await.get_summary());

    if let Some(synth) = synthesizer {
        synth.wait().await;
    }
    Ok(())
}

/// Capture one utterance and print its transcript.
pub async fn run_dictation(settings: &AppSettings, timeout: Duration) -> Result<(), String> {
    let recognizer = Arc::new(ConsoleRecognizer::new());
    let cancel = CancellationToken::new();
    let mut lines = spawn_stdin_lines(cancel.clone());

    let feeder = recognizer.clone();
    let feed_cancel = cancel.clone();
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            if feeder.offer_line(&line) {
                break;
            }
        }
        feed_cancel.cancel();
    });

    println!("Listening... (type what you say, then Enter)");
    let result = dictate(recognizer, &settings.language_hints(), timeout).await;
    cancel.cancel();

    let text = result.map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

/// Speak text through the configured synthesizer and wait for it to finish.
pub async fn run_speak(settings: &AppSettings, text: &str, language: Option<&str>) -> Result<(), String> {
    let synth = CommandSynthesizer::new(settings.speech.synthesizer_command.clone())
        .map_err(|e| e.to_string())?;
    let language = language.unwrap_or(settings.speech.synthesis_language.as_str());
    read_aloud(&synth, text, language).map_err(|e| e.to_string())?;
    synth.wait().await;
    Ok(())
}
