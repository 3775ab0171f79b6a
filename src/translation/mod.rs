//! Translation of assistant replies before playback

mod azure;

pub use azure::AzureTranslator;

use async_trait::async_trait;

/// Errors that can occur during translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// Transport failure, deadline or unexpected HTTP status
    Network(String),
    /// Service rejected the subscription key
    Auth(String),
    /// Body could not be parsed or carried no translation
    Malformed(String),
    /// Caller passed blank text; nothing was sent
    EmptyInput,
}

impl std::fmt::Display for TranslationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationError::Network(e) => write!(f, "Translation network error: {}", e),
            TranslationError::Auth(e) => write!(f, "Translation authentication failed: {}", e),
            TranslationError::Malformed(e) => write!(f, "Unexpected translation response: {}", e),
            TranslationError::EmptyInput => write!(f, "Nothing to translate"),
        }
    }
}

impl std::error::Error for TranslationError {}

/// Stateless single-shot translation.
#[async_trait]
pub trait Translator: Send + Sync + 'static {
    async fn translate(&self, text: &str, from: &str, to: &str)
        -> Result<String, TranslationError>;
}
