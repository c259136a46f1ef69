//! OpenAI chat completions wire format (also used by compatible servers)

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::DispatchError;

use super::types::{ChatRequest, NormalizedReply};

/// `{base_url}/chat/completions`
pub fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Build the request body: system prompts first, then the exchange
pub fn request_body(request: &ChatRequest) -> Value {
    let messages: Vec<Value> = request
        .system
        .iter()
        .map(|s| json!({"role": "system", "content": s}))
        .chain(
            request
                .messages
                .iter()
                .map(|m| json!({"role": m.role.to_string(), "content": m.content})),
        )
        .collect();

    json!({
        "model": request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": messages,
    })
}

/// Extract the first choice's text
pub fn parse_reply(raw: &Value) -> Result<NormalizedReply, DispatchError> {
    let text = first_choice_text(raw)?;
    Ok(NormalizedReply {
        text,
        citations: Vec::new(),
    })
}

pub(crate) fn first_choice_text(raw: &Value) -> Result<String, DispatchError> {
    let resp = OpenAiApiResponse::deserialize(raw)?;
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DispatchError::Malformed("response had no choices".to_string()))?;

    let text = choice.message.content.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(DispatchError::EmptyReply);
    }
    Ok(text.trim().to_string())
}

// ── OpenAI wire types ──

#[derive(Debug, Deserialize)]
struct OpenAiApiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}
