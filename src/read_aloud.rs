//! Speak arbitrary text, outside of any chat session.

use crate::speech::{PlaybackError, PlaybackSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadAloudError {
    /// Nothing to say
    Blank,
    Playback(PlaybackError),
}

impl std::fmt::Display for ReadAloudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadAloudError::Blank => write!(f, "Enter text to speak"),
            ReadAloudError::Playback(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ReadAloudError {}

impl From<PlaybackError> for ReadAloudError {
    fn from(e: PlaybackError) -> Self {
        ReadAloudError::Playback(e)
    }
}

/// Speak `text` in `language`, interrupting anything already playing.
pub fn read_aloud(sink: &dyn PlaybackSink, text: &str, language: &str) -> Result<(), ReadAloudError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ReadAloudError::Blank);
    }
    sink.speak(text, language)?;
    Ok(())
}
