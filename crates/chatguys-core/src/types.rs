//! Shared types for chatguys-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker name reserved for the human side of the conversation
pub const USER_SPEAKER: &str = "user";

/// Who produced a transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Speaker {
    User,
    Role(String),
}

impl Speaker {
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::User => USER_SPEAKER,
            Self::Role(id) => id,
        }
    }

    /// True when this speaker is the given role (ids match case-insensitively)
    pub fn is_role(&self, role_id: &str) -> bool {
        match self {
            Self::User => false,
            Self::Role(id) => id.eq_ignore_ascii_case(role_id),
        }
    }
}

impl From<String> for Speaker {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case(USER_SPEAKER) {
            Self::User
        } else {
            Self::Role(s)
        }
    }
}

impl From<Speaker> for String {
    fn from(speaker: Speaker) -> Self {
        match speaker {
            Speaker::User => USER_SPEAKER.to_string(),
            Speaker::Role(id) => id,
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an entry carries conversation content or a surfaced failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Message,
    Error,
}

/// A source reference attached to an agent reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Label as referenced from the reply text, e.g. "1" for "[1]"
    pub label: String,
    /// Source locator, usually a URL
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Citation {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl std::fmt::Display for Citation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.title {
            Some(title) => write!(f, "[{}] {} ({})", self.label, title, self.source),
            None => write!(f, "[{}] {}", self.label, self.source),
        }
    }
}

/// One immutable line of the shared transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub seq: u64,
    pub speaker: Speaker,
    pub text: String,
    #[serde(default)]
    pub kind: EntryKind,
    /// Role ids a user entry was addressed to (empty for agent entries)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addressed_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn is_error(&self) -> bool {
        self.kind == EntryKind::Error
    }

    /// Render as a single history line: `[2024-01-01 12:00:00] Tech: text`
    pub fn format_for_history(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.speaker,
            self.text
        )
    }
}

/// Entry content before the store assigns a sequence number and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub speaker: Speaker,
    pub text: String,
    pub kind: EntryKind,
    pub addressed_to: Vec<String>,
    pub citations: Vec<Citation>,
}

impl NewEntry {
    /// A user segment addressed to the given roles
    pub fn user(text: impl Into<String>, addressed_to: Vec<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            kind: EntryKind::Message,
            addressed_to,
            citations: Vec::new(),
        }
    }

    /// A normalized agent reply
    pub fn reply(role_id: impl Into<String>, text: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            speaker: Speaker::Role(role_id.into()),
            text: text.into(),
            kind: EntryKind::Message,
            addressed_to: Vec::new(),
            citations,
        }
    }

    /// A visible failure marker for a role
    pub fn error(role_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Role(role_id.into()),
            text: text.into(),
            kind: EntryKind::Error,
            addressed_to: Vec::new(),
            citations: Vec::new(),
        }
    }
}

/// One parsed piece of an input line: the roles it targets and its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionSegment {
    /// Canonical role ids, in mention order, without duplicates
    pub roles: Vec<String>,
    pub text: String,
}

impl MentionSegment {
    pub fn new(roles: Vec<String>, text: impl Into<String>) -> Self {
        Self {
            roles,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_string_conversion() {
        assert_eq!(Speaker::from("user".to_string()), Speaker::User);
        assert_eq!(Speaker::from("USER".to_string()), Speaker::User);
        assert_eq!(
            Speaker::from("Tech".to_string()),
            Speaker::Role("Tech".to_string())
        );
        assert_eq!(String::from(Speaker::User), "user");
        assert_eq!(Speaker::Role("Tech".to_string()).to_string(), "Tech");
    }

    #[test]
    fn test_speaker_is_role_case_insensitive() {
        let speaker = Speaker::Role("Tech".to_string());
        assert!(speaker.is_role("tech"));
        assert!(!speaker.is_role("Creative"));
        assert!(!Speaker::User.is_role("user"));
    }

    #[test]
    fn test_entry_serializes_speaker_as_plain_string() {
        let entry = TranscriptEntry {
            seq: 3,
            speaker: Speaker::Role("Tech".to_string()),
            text: "hi".to_string(),
            kind: EntryKind::Message,
            addressed_to: vec![],
            citations: vec![Citation::new("1", "https://example.com")],
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["speaker"], "Tech");
        assert_eq!(json["kind"], "message");
        assert!(json.get("addressed_to").is_none());
        assert_eq!(json["citations"][0]["source"], "https://example.com");

        let back: TranscriptEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_citation_display() {
        let plain = Citation::new("1", "https://a.example");
        assert_eq!(plain.to_string(), "[1] https://a.example");
        let titled = Citation::new("2", "https://b.example").with_title("B");
        assert_eq!(titled.to_string(), "[2] B (https://b.example)");
    }

    #[test]
    fn test_format_for_history() {
        let entry = TranscriptEntry {
            seq: 0,
            speaker: Speaker::User,
            text: "hello".to_string(),
            kind: EntryKind::Message,
            addressed_to: vec!["Tech".to_string()],
            citations: vec![],
            timestamp: "2024-05-01T09:30:00Z".parse().unwrap(),
        };
        assert_eq!(entry.format_for_history(), "[2024-05-01 09:30:00] user: hello");
    }
}
