use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::speech::LanguageHints;

const SETTINGS_DIR_NAME: &str = "voicebot";
const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_PERSONA: &str = "You are a helpful telecom assistant. Always respond in ENGLISH language. \
Keep your responses SHORT and CONCISE. You can imagine things that are within the organization \
such as package details to respond to the user. Do not add any unspeakable markdown symbols to \
response. Do not say anything about the language you are responding.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// System message every session starts with.
    pub persona: String,
    pub speech: SpeechSettings,
    pub completion: CompletionSettings,
    pub translation: TranslationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Recognizer language (BCP-47).
    pub capture_language: String,
    /// Preferred fallback when the recognizer cannot use `capture_language`.
    pub capture_fallback_language: Option<String>,
    /// Synthesizer language (BCP-47).
    pub synthesis_language: String,
    /// External synthesizer program; playback is text-only if it cannot be run.
    pub synthesizer_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// Azure OpenAI resource endpoint, e.g. https://my-resource.openai.azure.com
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    /// Reply length cap, in tokens.
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    /// Translate assistant replies before speaking them.
    pub enabled: bool,
    pub endpoint: String,
    pub region: Option<String>,
    pub api_version: String,
    pub from: String,
    pub to: String,
    pub timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            speech: SpeechSettings::default(),
            completion: CompletionSettings::default(),
            translation: TranslationSettings::default(),
        }
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            capture_language: "si-LK".to_string(),
            capture_fallback_language: Some("en-HI".to_string()),
            synthesis_language: "si-LK".to_string(),
            synthesizer_command: "espeak-ng".to_string(),
        }
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: "gpt-4o-mini".to_string(),
            api_version: "2024-08-01-preview".to_string(),
            max_tokens: 100,
            temperature: 0.7,
            top_p: 1.0,
            timeout_secs: 30,
        }
    }
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.cognitive.microsofttranslator.com".to_string(),
            region: Some("westus2".to_string()),
            api_version: "3.0".to_string(),
            from: "en".to_string(),
            to: "si".to_string(),
            timeout_secs: 15,
        }
    }
}

impl AppSettings {
    pub fn language_hints(&self) -> LanguageHints {
        LanguageHints {
            primary: self.speech.capture_language.clone(),
            fallback: self.speech.capture_fallback_language.clone(),
        }
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion.timeout_secs.max(1))
    }

    pub fn translation_timeout(&self) -> Duration {
        Duration::from_secs(self.translation.timeout_secs.max(1))
    }

    /// Settings that would make every turn fail. Reported at startup.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.persona.trim().is_empty() {
            problems.push("persona is empty".to_string());
        }
        if self.completion.endpoint.trim().is_empty() {
            problems.push("completion.endpoint is not set".to_string());
        }
        if self.completion.max_tokens == 0 {
            problems.push("completion.max_tokens must be greater than 0".to_string());
        }
        if self.translation.enabled
            && (self.translation.from.is_empty() || self.translation.to.is_empty())
        {
            problems.push("translation.from and translation.to are required".to_string());
        }
        problems
    }
}

pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> AppSettings {
    match settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            AppSettings::default()
        }
    }
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // rename() replaces atomically on Unix but fails on Windows if the target exists.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
