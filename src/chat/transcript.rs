use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persona;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl TranscriptMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered log of exchanged messages
///
/// Entries are only ever appended; the one mutation allowed is appending
/// streamed text to an existing entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<TranscriptMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript opened by Nayla's greeting
    pub fn with_greeting() -> Self {
        let mut transcript = Self::new();
        transcript.push(Role::Assistant, persona::GREETING);
        transcript
    }

    /// Append an entry and return its index
    pub fn push(&mut self, role: Role, text: impl Into<String>) -> usize {
        self.messages.push(TranscriptMessage::new(role, text));
        self.messages.len() - 1
    }

    /// Append a streamed fragment to the entry at `index`
    pub fn append_text(&mut self, index: usize, fragment: &str) -> bool {
        match self.messages.get_mut(index) {
            Some(message) => {
                message.text.push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Fill the entry at `index` with `text` if it is still empty
    pub fn fill_if_empty(&mut self, index: usize, text: &str) -> bool {
        match self.messages.get_mut(index) {
            Some(message) if message.text.is_empty() => {
                message.text.push_str(text);
                true
            }
            _ => false,
        }
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&TranscriptMessage> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&TranscriptMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_opens_transcript() {
        let transcript = Transcript::with_greeting();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].role, Role::Assistant);
        assert!(transcript.messages()[0].text.starts_with("Halo! Aku Nayla"));
    }

    #[test]
    fn fragments_append_in_place() {
        let mut transcript = Transcript::new();
        transcript.push(Role::User, "hi");
        let reply = transcript.push(Role::Assistant, "");

        assert!(transcript.append_text(reply, "Hal"));
        assert!(transcript.append_text(reply, "o!"));
        assert!(!transcript.append_text(9, "x"));

        assert_eq!(transcript.get(reply).unwrap().text, "Halo!");
        assert_eq!(transcript.get(0).unwrap().text, "hi");
    }

    #[test]
    fn fill_only_touches_empty_entries() {
        let mut transcript = Transcript::new();
        let empty = transcript.push(Role::Assistant, "");
        let partial = transcript.push(Role::Assistant, "Hal");

        assert!(transcript.fill_if_empty(empty, "sorry"));
        assert!(!transcript.fill_if_empty(partial, "sorry"));
        assert_eq!(transcript.get(empty).unwrap().text, "sorry");
        assert_eq!(transcript.get(partial).unwrap().text, "Hal");
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(TranscriptMessage::new(Role::User, "x")).unwrap();
        assert_eq!(json["role"], "user");
    }
}
