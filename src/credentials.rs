//! API keys for the completion and translation services.
//!
//! Lookup order: environment variable (handy with a `.env` file during
//! development), then the OS keyring:
//! - Linux: libsecret (GNOME Keyring/KDE Wallet)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! Never log a key value; use [`mask_key`] for display.

use keyring::Entry;

const SERVICE_NAME: &str = "voicebot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiService {
    Completion,
    Translation,
}

impl ApiService {
    fn keyring_name(&self) -> &'static str {
        match self {
            ApiService::Completion => "completion-api-key",
            ApiService::Translation => "translator-api-key",
        }
    }

    pub fn env_var(&self) -> &'static str {
        match self {
            ApiService::Completion => "VOICEBOT_COMPLETION_KEY",
            ApiService::Translation => "VOICEBOT_TRANSLATOR_KEY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApiService::Completion => "completion",
            ApiService::Translation => "translation",
        }
    }
}

impl std::str::FromStr for ApiService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(ApiService::Completion),
            "translation" | "translator" => Ok(ApiService::Translation),
            other => Err(format!(
                "Unknown service '{}' (expected 'completion' or 'translation')",
                other
            )),
        }
    }
}

fn key_from_env(service: ApiService) -> Option<String> {
    std::env::var(service.env_var())
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

fn key_from_keyring(service: ApiService) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, service.keyring_name()) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("Credentials: failed to create keyring entry: {}", e);
            return None;
        }
    };

    match entry.get_password() {
        Ok(key) if key.is_empty() => None,
        Ok(key) => Some(key),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!(
                "Credentials: failed to retrieve {} key: {}",
                service.label(),
                e
            );
            None
        }
    }
}

/// Retrieve the key for a service, if configured.
pub fn get_api_key(service: ApiService) -> Option<String> {
    key_from_env(service).or_else(|| key_from_keyring(service))
}

/// Store the key in the system keyring. Pass None to delete it.
pub fn set_api_key(service: ApiService, key: Option<&str>) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, service.keyring_name())
        .map_err(|e| format!("Failed to create keyring entry: {}", e))?;

    match key.map(str::trim) {
        Some(k) if !k.is_empty() => {
            entry
                .set_password(k)
                .map_err(|e| format!("Failed to store {} key: {}", service.label(), e))?;
            log::info!("Credentials: stored new {} key", service.label());
        }
        _ => match entry.delete_credential() {
            Ok(()) => log::info!("Credentials: deleted {} key", service.label()),
            Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(format!("Failed to delete {} key: {}", service.label(), e)),
        },
    }

    Ok(())
}

/// Masked version of a key for display (e.g. "b08...53b8e9")
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
