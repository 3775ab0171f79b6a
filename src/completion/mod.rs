//! Chat completion for the voice chatbot
//!
//! The full dialogue history is sent on every call; the reply is handed back
//! to the caller, which decides whether to record it.

mod azure;

pub use azure::AzureOpenAiClient;

use async_trait::async_trait;

use crate::history::{Message, Role};

/// Errors that can occur while requesting a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Transport failure or unexpected HTTP status
    Network(String),
    /// Service rejected the credentials
    Auth(String),
    /// Service asked us to slow down
    RateLimited,
    /// Body could not be parsed or carried no reply
    Malformed(String),
    /// Deadline elapsed before a reply arrived
    Timeout,
    /// History was empty or did not start with the system message
    InvalidHistory,
}

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionError::Network(e) => write!(f, "Network error: {}", e),
            CompletionError::Auth(e) => write!(f, "Authentication failed: {}", e),
            CompletionError::RateLimited => write!(f, "Rate limited - try again later"),
            CompletionError::Malformed(e) => write!(f, "Unexpected response: {}", e),
            CompletionError::Timeout => write!(f, "The assistant took too long to reply"),
            CompletionError::InvalidHistory => {
                write!(f, "Conversation must start with the system message")
            }
        }
    }
}

impl std::error::Error for CompletionError {}

/// Remote chat completion. One request per call, no retries.
#[async_trait]
pub trait CompletionClient: Send + Sync + 'static {
    async fn complete(&self, history: &[Message]) -> Result<String, CompletionError>;
}

/// Input constraint shared by all clients.
pub fn validate_history(history: &[Message]) -> Result<(), CompletionError> {
    match history.first() {
        Some(first) if first.role() == Role::System => Ok(()),
        _ => Err(CompletionError::InvalidHistory),
    }
}
