//! Provider-agnostic request and reply types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::roles::Role;
use crate::types::Citation;

/// Message role in an outbound exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of the exchange sent to a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a provider needs to answer for one role
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// System instructions, in order (role prompt first)
    pub system: Vec<String>,
    /// Prior transcript as alternating turns, oldest first
    pub messages: Vec<ChatMessage>,
}

/// Canonical reply shape, independent of provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedReply {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// A remote model endpoint. Returns the provider-native JSON reply; turning
/// it into a [`NormalizedReply`] is the normalizer's job.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    async fn complete(&self, role: &Role, request: &ChatRequest) -> Result<Value>;
}
