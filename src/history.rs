//! Dialogue history and the displayed transcript
//!
//! The history is the prompt context replayed to the completion service on
//! every turn. It is seeded with exactly one system message and only ever
//! grows: nothing is removed or reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered, append-only conversation log.
///
/// Invariant: never empty, element 0 is the system persona. There is no way
/// to remove or replace a message once appended.
#[derive(Debug, Clone)]
pub struct DialogueHistory {
    messages: Vec<Message>,
}

impl DialogueHistory {
    /// Start a session seeded with the persona/instructions.
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(persona)],
        }
    }

    /// Append a user or assistant message.
    ///
    /// A second system message is stored as-is after the existing ones; the
    /// first element stays the seeded persona.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    /// Copy of the full ordered sequence, safe to hand to another task.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn persona(&self) -> &str {
        self.messages[0].content()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn last(&self) -> &Message {
        // Never empty: constructed with the system message.
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// One rendered chat bubble.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEntry {
    pub text: String,
    pub is_user: bool,
    pub at: DateTime<Utc>,
}

impl DisplayEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            at: Utc::now(),
        }
    }
}

/// Append-only list of bubbles shown to the user (system messages excluded).
#[derive(Debug, Clone, Default)]
pub struct DisplayedTranscript {
    entries: Vec<DisplayEntry>,
}

impl DisplayedTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DisplayEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_history_holds_only_the_persona() {
        let history = DialogueHistory::new("be brief");
        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshot(), vec![Message::system("be brief")]);
        assert_eq!(history.persona(), "be brief");
    }

    #[test]
    fn turns_grow_history_by_two_and_keep_system_first() {
        let mut history = DialogueHistory::new("persona");
        for i in 0..5 {
            history.append(Role::User, format!("question {}", i));
            history.append(Role::Assistant, format!("answer {}", i));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 1 + 2 * 5);
        assert_eq!(snapshot[0].role(), Role::System);
        assert_eq!(snapshot[1], Message::user("question 0"));
        assert_eq!(snapshot[10], Message::assistant("answer 4"));
    }

    #[test]
    fn snapshot_is_detached_from_history() {
        let mut history = DialogueHistory::new("persona");
        let mut snapshot = history.snapshot();
        snapshot.push(Message::user("not recorded"));
        history.append(Role::User, "recorded");

        assert_eq!(history.len(), 2);
        assert_eq!(history.last().content(), "recorded");
    }

    #[test]
    fn message_serializes_as_role_content_pair() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn transcript_is_append_only_in_order() {
        let mut transcript = DisplayedTranscript::new();
        transcript.push(DisplayEntry::user("hello"));
        transcript.push(DisplayEntry::assistant("hi there"));

        let texts: Vec<_> = transcript
            .entries()
            .iter()
            .map(|e| (e.text.as_str(), e.is_user))
            .collect();
        assert_eq!(texts, vec![("hello", true), ("hi there", false)]);
    }
}
