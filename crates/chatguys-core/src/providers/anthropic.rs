//! Anthropic messages API wire format

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::DispatchError;
use crate::types::Citation;

use super::types::{ChatMessage, ChatRequest, ChatRole, NormalizedReply};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Sent as the opening user turn when the exchange would otherwise be empty
/// or start with an assistant turn, which the API rejects.
const OPENING_TURN: &str = "(The conversation continues.)";

/// `{base_url}/messages`
pub fn messages_url(base_url: &str) -> String {
    format!("{}/messages", base_url.trim_end_matches('/'))
}

pub fn request_body(request: &ChatRequest) -> Value {
    let messages: Vec<Value> = merge_turns(&request.messages)
        .into_iter()
        .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
        .collect();

    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": messages,
    });
    if !request.system.is_empty() {
        body["system"] = Value::String(request.system.join("\n\n"));
    }
    body
}

/// The API wants strictly alternating user/assistant turns starting with user
fn merge_turns(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut merged: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for msg in messages {
        match merged.last_mut() {
            Some(last) if last.role == msg.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => merged.push(msg.clone()),
        }
    }
    if merged.first().is_none_or(|m| m.role != ChatRole::User) {
        merged.insert(0, ChatMessage::user(OPENING_TURN));
    }
    merged
}

/// Concatenate text blocks; collect `citations` attached to them
pub fn parse_reply(raw: &Value) -> Result<NormalizedReply, DispatchError> {
    let resp = AnthropicApiResponse::deserialize(raw)?;

    let mut text = String::new();
    let mut citations: Vec<Citation> = Vec::new();
    for block in resp.content {
        let AnthropicBlock::Text {
            text: part,
            citations: cited,
        } = block
        else {
            continue;
        };
        text.push_str(&part);
        for c in cited.unwrap_or_default() {
            let Some(source) = c.url.or(c.document_title.clone()) else {
                continue;
            };
            if citations.iter().any(|existing| existing.source == source) {
                continue;
            }
            let citation = Citation::new((citations.len() + 1).to_string(), source);
            citations.push(match c.title.or(c.document_title) {
                Some(title) if !title.is_empty() => citation.with_title(title),
                _ => citation,
            });
        }
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(DispatchError::EmptyReply);
    }
    Ok(NormalizedReply {
        text: text.to_string(),
        citations,
    })
}

// ── Anthropic wire types ──

#[derive(Debug, Deserialize)]
struct AnthropicApiResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
        #[serde(default)]
        citations: Option<Vec<AnthropicCitation>>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicCitation {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    document_title: Option<String>,
}
