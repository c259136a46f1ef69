use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use chatguys_core::roles::mask_secret;
use chatguys_core::{Credentials, DispatchConfig, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory of role YAML files; relative paths are resolved against
    /// the directory holding config.toml
    #[serde(default = "default_roles_dir")]
    pub roles_dir: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Where this config was read from
    #[serde(skip)]
    pub source: PathBuf,
}

fn default_roles_dir() -> String {
    "roles".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            roles_dir: default_roles_dir(),
            session: SessionConfig::default(),
            providers: ProvidersConfig::default(),
            source: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default = "default_mention_marker")]
    pub mention_marker: char,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_history_dir")]
    pub history_dir: String,
    #[serde(default = "default_true")]
    pub autosave: bool,
}

fn default_role() -> String {
    "Default".to_string()
}
fn default_mention_marker() -> char {
    '@'
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_context_window() -> usize {
    100
}
fn default_max_retries() -> u32 {
    1
}
fn default_history_dir() -> String {
    "~/.local/share/chatguys/sessions".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_role: default_role(),
            mention_marker: default_mention_marker(),
            timeout_secs: default_timeout_secs(),
            context_window: default_context_window(),
            max_retries: default_max_retries(),
            history_dir: default_history_dir(),
            autosave: default_true(),
        }
    }
}

impl SessionConfig {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            context_window: self.context_window,
        }
    }

    /// HTTP timeout for a single attempt, so every retry fits inside the
    /// dispatch deadline
    pub fn attempt_timeout(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        (Duration::from_secs(self.timeout_secs) / attempts).max(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderDefaults,
    #[serde(default)]
    pub search: ProviderDefaults,
    #[serde(default)]
    pub anthropic: ProviderDefaults,
}

/// Global credentials for one provider kind; roles fall back to these
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderDefaults {
    #[serde(default)]
    pub api_key: String,
    /// Empty means the provider's public endpoint
    #[serde(default)]
    pub base_url: String,
}

impl std::fmt::Debug for ProviderDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDefaults")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProvidersConfig {
    pub fn defaults_for(&self, kind: ProviderKind) -> Credentials {
        let p = match kind {
            ProviderKind::Openai => &self.openai,
            ProviderKind::Search => &self.search,
            ProviderKind::Anthropic => &self.anthropic,
        };
        Credentials::new(p.api_key.clone(), p.base_url.clone())
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("chatguys")
}

impl AppConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // The file may hold API keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    warn!(
                        "Config file {} is readable by other users ({:o}). Fix with: chmod 600 {}",
                        path.display(),
                        mode & 0o777,
                        path.display()
                    );
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `chatguys init` first.",
                path.display()
            )
        })?;

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.source = path;

        for (name, p) in [
            ("openai", &config.providers.openai),
            ("search", &config.providers.search),
            ("anthropic", &config.providers.anthropic),
        ] {
            if p.api_key.starts_with("sk-") || p.api_key.starts_with("pplx-") {
                warn!(
                    "The {} API key is hardcoded in the config file. Prefer an environment variable, e.g. api_key = \"${{OPENAI_API_KEY}}\"",
                    name
                );
            }
        }

        Ok(config)
    }

    /// Expand allowed `${VAR}` references, parse, and validate
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok());
        let config: Self = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let marker = self.session.mention_marker;
        if marker.is_alphanumeric() || marker == '_' || marker.is_whitespace() {
            return Err(anyhow!(
                "session.mention_marker '{}' is not usable: pick a symbol such as '@'",
                marker
            ));
        }
        if self.session.timeout_secs == 0 {
            return Err(anyhow!("session.timeout_secs must be at least 1"));
        }
        if self.session.default_role.trim().is_empty() {
            return Err(anyhow!("session.default_role must not be empty"));
        }
        Ok(())
    }

    pub fn roles_dir(&self) -> PathBuf {
        let dir = expand_home(&self.roles_dir);
        if dir.is_absolute() {
            return dir;
        }
        let base = self.source.parent().unwrap_or_else(|| Path::new("."));
        base.join(dir)
    }

    pub fn history_dir(&self) -> PathBuf {
        expand_home(&self.session.history_dir)
    }

    /// Copy with API keys masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for p in [
            &mut copy.providers.openai,
            &mut copy.providers.search,
            &mut copy.providers.anthropic,
        ] {
            if !p.api_key.is_empty() {
                p.api_key = mask_secret(&p.api_key);
            }
        }
        copy
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "PERPLEXITY_API_KEY",
    "PERPLEXITY_BASE_URL",
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_BASE_URL",
    "HOME",
    "USER",
];

/// Replace `${VAR}` with its value for allowlisted names. Unknown names are
/// left as written; unset allowlisted names expand to an empty string.
fn expand_env_vars<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + len];
        out.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&var_name) {
            out.push_str(&lookup(var_name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            out.push_str(&rest[start..=start + len]);
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(s: &str) -> PathBuf {
    match (s.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(s),
    }
}
