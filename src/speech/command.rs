//! Speech synthesis through an external command (espeak-ng by default)

use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::{Child, Command};

use super::{PlaybackError, PlaybackSink};

/// Speaks by spawning `<program> -v <voice> -- <text>`.
///
/// Only one utterance runs at a time: a new `speak` kills the previous child
/// before spawning the next one.
#[derive(Debug)]
pub struct CommandSynthesizer {
    program: String,
    current: Mutex<Option<Child>>,
}

impl CommandSynthesizer {
    /// Run the program once; failure means playback should degrade to text.
    pub fn new(program: impl Into<String>) -> Result<Self, PlaybackError> {
        let program = program.into();
        std::process::Command::new(&program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| PlaybackError::Unavailable(format!("{}: {}", program, e)))?;

        log::info!("Synthesizer initialized: {}", program);
        Ok(Self {
            program,
            current: Mutex::new(None),
        })
    }

    /// Wait for the current utterance (if any) to finish.
    pub async fn wait(&self) {
        let child = match self.current.lock() {
            Ok(mut current) => current.take(),
            Err(_) => None,
        };
        if let Some(mut child) = child {
            if let Err(e) = child.wait().await {
                log::warn!("Synthesizer: wait failed: {}", e);
            }
        }
    }
}

/// Arguments for one utterance. `--` ends option parsing so text that starts
/// with a dash is spoken, not read as a flag.
fn speak_args(language: &str, text: &str) -> [String; 4] {
    [
        "-v".to_string(),
        voice_for(language),
        "--".to_string(),
        text.to_string(),
    ]
}

/// Map a BCP-47 tag ("si-LK") to an espeak voice ("si").
fn voice_for(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase()
}

impl PlaybackSink for CommandSynthesizer {
    fn speak(&self, text: &str, language: &str) -> Result<(), PlaybackError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| PlaybackError::Failed("synthesizer lock poisoned".into()))?;

        if let Some(mut previous) = current.take() {
            if let Err(e) = previous.start_kill() {
                log::debug!("Synthesizer: previous utterance already gone: {}", e);
            }
        }

        let child = Command::new(&self.program)
            .args(speak_args(language, text))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Failed(e.to_string()))?;

        log::debug!(
            "Synthesizer: speaking {} chars ({})",
            text.chars().count(),
            language
        );
        *current = Some(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_is_primary_language_subtag() {
        assert_eq!(voice_for("si-LK"), "si");
        assert_eq!(voice_for("en_US"), "en");
        assert_eq!(voice_for("FR"), "fr");
    }

    #[test]
    fn text_starting_with_a_dash_is_not_an_option() {
        let args = speak_args("en-US", "-5 degrees outside");
        assert_eq!(args, ["-v", "en", "--", "-5 degrees outside"]);
    }

    #[test]
    fn missing_program_is_unavailable() {
        let err = CommandSynthesizer::new("definitely-not-a-real-tts-binary-4242").unwrap_err();
        assert!(matches!(err, PlaybackError::Unavailable(_)));
    }
}
