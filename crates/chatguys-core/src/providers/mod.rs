//! Provider layer: request building, HTTP transport and reply normalization
//!
//! Three wire formats are supported: OpenAI chat completions (and compatible
//! servers), search-augmented OpenAI-style replies carrying citation
//! metadata, and the Anthropic messages API. The dispatcher talks to a
//! [`ModelEndpoint`] and hands the raw reply to a [`ResponseNormalizer`].

pub mod anthropic;
pub mod http;
pub mod normalize;
pub mod openai;
pub mod search;
pub mod types;

pub use http::HttpEndpoint;
pub use normalize::ResponseNormalizer;
pub use types::{ChatMessage, ChatRequest, ChatRole, ModelEndpoint, NormalizedReply};
