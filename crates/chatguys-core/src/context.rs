//! Builds the outbound request for one role from the shared transcript

use std::sync::Arc;
use tracing::debug;

use crate::providers::{ChatMessage, ChatRequest};
use crate::roles::Role;
use crate::types::{Speaker, TranscriptEntry};

/// Second system message, sent after the role prompt
pub const ADDRESSING_NOTE: &str = "The conversation history includes context about who messages are addressed to. \
Pay attention to the conversation flow and context when responding.";

/// System instructions for a role: its prompt, then the addressing note
pub fn build_system(role: &Role) -> Vec<String> {
    let mut system = Vec::with_capacity(2);
    let prompt = role.prompt.trim();
    if !prompt.is_empty() {
        system.push(prompt.to_string());
    }
    system.push(ADDRESSING_NOTE.to_string());
    system
}

/// Render one transcript entry as seen by `role_id`.
///
/// - user entries become user turns, prefixed with `[To A, B]` when addressed
/// - the role's own replies become assistant turns
/// - other roles' replies become user turns prefixed with `[Name]`
/// - error entries are not part of any model's context
pub fn render_entry(entry: &TranscriptEntry, role_id: &str) -> Option<ChatMessage> {
    if entry.is_error() {
        return None;
    }
    match &entry.speaker {
        Speaker::User if entry.addressed_to.is_empty() => Some(ChatMessage::user(&entry.text)),
        Speaker::User => Some(ChatMessage::user(format!(
            "[To {}] {}",
            entry.addressed_to.join(", "),
            entry.text
        ))),
        speaker if speaker.is_role(role_id) => Some(ChatMessage::assistant(&entry.text)),
        Speaker::Role(other) => Some(ChatMessage::user(format!("[{}] {}", other, entry.text))),
    }
}

/// Build the request for `role` over `history`, keeping at most the last
/// `context_window` renderable entries (0 keeps everything).
pub fn build_request(
    role: &Role,
    history: &[Arc<TranscriptEntry>],
    context_window: usize,
) -> ChatRequest {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .filter_map(|entry| render_entry(entry, &role.id))
        .collect();
    if context_window > 0 && messages.len() > context_window {
        messages.drain(..messages.len() - context_window);
    }

    debug!(
        "Built request for {}: {} of {} entries",
        role.id,
        messages.len(),
        history.len()
    );

    ChatRequest {
        model: role.model.engine.clone(),
        temperature: role.model.temperature,
        max_tokens: role.model.max_tokens,
        system: build_system(role),
        messages,
    }
}
