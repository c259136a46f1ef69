//! Turns provider-native replies into [`NormalizedReply`]

use serde_json::Value;

use crate::error::DispatchError;
use crate::roles::ProviderKind;

use super::types::NormalizedReply;
use super::{anthropic, openai, search};

/// One variant per provider kind. Adding a provider means adding a variant
/// here; the dispatcher only ever calls [`ResponseNormalizer::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseNormalizer {
    Openai,
    Search,
    Anthropic,
}

impl ResponseNormalizer {
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Openai => Self::Openai,
            ProviderKind::Search => Self::Search,
            ProviderKind::Anthropic => Self::Anthropic,
        }
    }

    pub fn normalize(&self, raw: &Value) -> Result<NormalizedReply, DispatchError> {
        match self {
            Self::Openai => openai::parse_reply(raw),
            Self::Search => search::parse_reply(raw),
            Self::Anthropic => anthropic::parse_reply(raw),
        }
    }
}
