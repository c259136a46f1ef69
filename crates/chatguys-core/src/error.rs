//! Error types for the transcript, the role registry and per-role dispatch

use std::time::Duration;
use thiserror::Error;

/// Rejections from [`crate::transcript::ConversationStore`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown speaker '{0}': not the user and not a configured role")]
    UnknownSpeaker(String),

    #[error("stale append from generation {started} (store is at generation {current})")]
    StaleGeneration { started: u64, current: u64 },
}

/// Problems found while building a [`crate::roles::RoleRegistry`]
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("role '{0}' is defined more than once (names are case-insensitive)")]
    DuplicateRole(String),

    #[error("default role '{0}' is not defined")]
    MissingDefault(String),

    #[error("role name '{0}' is invalid: use letters, digits and underscores only")]
    InvalidName(String),

    #[error("role name '{0}' is reserved")]
    ReservedName(String),

    #[error("role '{role}': temperature {value} is outside {min}..={max} for this provider")]
    TemperatureOutOfRange {
        role: String,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("role '{0}': max_tokens must be positive")]
    ZeroMaxTokens(String),

    #[error("role '{0}': model engine is empty")]
    MissingEngine(String),
}

/// A single role's dispatch failure; always surfaced as an error entry
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0:#}")]
    Endpoint(anyhow::Error),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("reply contained no text")]
    EmptyReply,
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
