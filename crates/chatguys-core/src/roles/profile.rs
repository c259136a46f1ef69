//! Role definition: prompt, model parameters, provider kind and credentials

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::types::USER_SPEAKER;

/// Which wire format and reply shape a role's endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions and compatible servers (Together, Groq, Ollama, ...)
    #[default]
    #[serde(alias = "openai_compatible", alias = "openai_compat")]
    Openai,
    /// OpenAI wire format with citation metadata in the reply (Perplexity style)
    #[serde(alias = "search_augmented", alias = "perplexity")]
    Search,
    /// Anthropic messages API
    Anthropic,
}

impl ProviderKind {
    /// Prefix of the role-specific environment overrides
    /// (`OPENAI_API_KEY_TECH`, `PERPLEXITY_BASE_URL_NEWS`, ...)
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Openai => "OPENAI",
            Self::Search => "PERPLEXITY",
            Self::Anthropic => "ANTHROPIC",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Openai => "https://api.openai.com/v1",
            Self::Search => "https://api.perplexity.ai",
            Self::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    /// Valid sampling temperature range accepted by the provider
    pub fn temperature_range(&self) -> (f32, f32) {
        match self {
            Self::Openai | Self::Search => (0.0, 2.0),
            Self::Anthropic => (0.0, 1.0),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Openai => write!(f, "openai"),
            Self::Search => write!(f, "search"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Model parameters sent with every request for a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub engine: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl ModelParams {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Resolved connection settings for one role
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Resolve credentials through the override chain:
    /// role-specific value, then `<PREFIX>_API_KEY_<ROLE>` / `<PREFIX>_BASE_URL_<ROLE>`
    /// from `env`, then the global default for the provider kind.
    pub fn resolve<F>(
        role_id: &str,
        kind: ProviderKind,
        role_api_key: Option<&str>,
        role_base_url: Option<&str>,
        env: F,
        defaults: &Credentials,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let upper = role_id.to_uppercase();
        let prefix = kind.env_prefix();
        let pick = |explicit: Option<&str>, env_name: String, fallback: &str| -> String {
            explicit
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| env(&env_name).filter(|v| !v.is_empty()))
                .unwrap_or_else(|| fallback.to_string())
        };

        let api_key = pick(
            role_api_key,
            format!("{}_API_KEY_{}", prefix, upper),
            &defaults.api_key,
        );
        let base_url = pick(
            role_base_url,
            format!("{}_BASE_URL_{}", prefix, upper),
            if defaults.base_url.is_empty() {
                kind.default_base_url()
            } else {
                &defaults.base_url
            },
        );

        Self { api_key, base_url }
    }
}

/// A named conversational participant
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: String,
    pub provider: ProviderKind,
    pub model: ModelParams,
    pub prompt: String,
    pub credentials: Credentials,
}

impl Role {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, model: ModelParams) -> Self {
        Self {
            id: id.into(),
            provider: ProviderKind::default(),
            model,
            prompt: prompt.into(),
            credentials: Credentials::default(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// One-line description: the first sentence of the prompt
    pub fn summary(&self) -> &str {
        let prompt = self.prompt.trim();
        match prompt.find(['.', '\n']) {
            Some(idx) => prompt[..idx].trim(),
            None => prompt,
        }
    }

    /// Check the role against the rules every registry member must satisfy
    pub fn validate(&self) -> Result<(), RegistryError> {
        if !is_valid_role_name(&self.id) {
            return Err(RegistryError::InvalidName(self.id.clone()));
        }
        if self.id.eq_ignore_ascii_case(USER_SPEAKER) {
            return Err(RegistryError::ReservedName(self.id.clone()));
        }
        if self.model.engine.trim().is_empty() {
            return Err(RegistryError::MissingEngine(self.id.clone()));
        }
        if self.model.max_tokens == 0 {
            return Err(RegistryError::ZeroMaxTokens(self.id.clone()));
        }
        let (min, max) = self.provider.temperature_range();
        if !(min..=max).contains(&self.model.temperature) {
            return Err(RegistryError::TemperatureOutOfRange {
                role: self.id.clone(),
                value: self.model.temperature,
                min,
                max,
            });
        }
        Ok(())
    }
}

/// Role names must be mentionable: letters, digits and underscores
pub fn is_valid_role_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Mask a secret for Debug output and logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}
