//! Role files: YAML definitions merged into a `RoleRegistry`

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_yml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use chatguys_core::{Credentials, ModelParams, ProviderKind, Role, RoleRegistry};

use crate::config::AppConfig;

/// One role as written in YAML
#[derive(Debug, Deserialize)]
struct RoleFile {
    prompt: String,
    #[serde(default)]
    provider: ProviderKind,
    model: RoleModel,
}

#[derive(Deserialize)]
struct RoleModel {
    engine: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default, alias = "openai_api_key")]
    api_key: Option<String>,
    #[serde(default, alias = "openai_base_url")]
    base_url: Option<String>,
}

impl std::fmt::Debug for RoleModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleModel")
            .field("engine", &self.engine)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "api_key",
                &self.api_key.as_deref().map(chatguys_core::roles::mask_secret),
            )
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

/// `*.yaml` and `*.yml` files in `dir`, sorted by file name
fn role_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Role directory {} not found", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Recursively merge `overlay` into `base`; mappings merge key by key,
/// anything else is replaced.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Read and merge every role file in `dir` into one mapping
pub fn load_role_tree(dir: &Path) -> Result<Mapping> {
    let files = role_files(dir)?;
    if files.is_empty() {
        return Err(anyhow!("No role files (*.yaml) found in {}", dir.display()));
    }

    let mut merged = Value::Mapping(Mapping::new());
    for path in &files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read role file {}", path.display()))?;
        let doc: Value = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse role file {}", path.display()))?;
        match doc {
            Value::Null => debug!("Role file {} is empty", path.display()),
            Value::Mapping(_) => deep_merge(&mut merged, doc),
            _ => {
                return Err(anyhow!(
                    "Role file {} must be a mapping of role names to definitions",
                    path.display()
                ));
            }
        }
    }
    debug!("Merged {} role file(s) from {}", files.len(), dir.display());

    match merged {
        Value::Mapping(map) => Ok(map),
        _ => Err(anyhow!("Merged role definitions are not a mapping")),
    }
}

/// Turn a merged role mapping into roles, resolving credentials through the
/// role → `<PREFIX>_API_KEY_<ROLE>` → global default chain.
pub fn build_roles<F>(tree: Mapping, cfg: &AppConfig, env: F) -> Result<Vec<Role>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut roles = Vec::with_capacity(tree.len());
    for (key, value) in tree {
        let id = match key {
            Value::String(s) => s,
            other => return Err(anyhow!("Role name {:?} is not a string", other)),
        };
        let def: RoleFile = serde_yml::from_value(value)
            .with_context(|| format!("Invalid definition for role '{}'", id))?;

        let credentials = Credentials::resolve(
            &id,
            def.provider,
            def.model.api_key.as_deref(),
            def.model.base_url.as_deref(),
            &env,
            &cfg.providers.defaults_for(def.provider),
        );
        let model = ModelParams {
            engine: def.model.engine,
            temperature: def.model.temperature,
            max_tokens: def.model.max_tokens,
        };
        roles.push(
            Role::new(id, def.prompt.trim(), model)
                .with_provider(def.provider)
                .with_credentials(credentials),
        );
    }
    Ok(roles)
}

/// Load the role directory named by `cfg` into a validated registry
pub fn load_registry(cfg: &AppConfig) -> Result<RoleRegistry> {
    let dir = cfg.roles_dir();
    let tree = load_role_tree(&dir)?;
    let roles = build_roles(tree, cfg, |name| std::env::var(name).ok())?;
    let registry = RoleRegistry::new(roles, &cfg.session.default_role)
        .with_context(|| format!("Invalid role set in {}", dir.display()))?;
    info!("Loaded {} roles from {}", registry.len(), dir.display());
    Ok(registry)
}
