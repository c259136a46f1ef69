//! Role registry, an immutable snapshot of the configured roles

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::profile::Role;
use crate::error::RegistryError;

/// Lookup surface the mention parser needs from a role set
pub trait KnownRoles {
    /// Canonical id for a name, matched case-insensitively
    fn canonical_id(&self, name: &str) -> Option<&str>;

    /// Role that receives lines without any mention
    fn default_id(&self) -> &str;
}

/// Role id with its one-line description, for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSummary {
    pub id: String,
    pub description: String,
    pub provider: String,
    pub engine: String,
    pub is_default: bool,
}

/// All roles known to a session. Never mutated after construction;
/// a reload builds a new registry and swaps it in whole.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    /// Keyed by lowercased id
    roles: HashMap<String, Arc<Role>>,
    /// Canonical ids in definition order
    order: Vec<String>,
    default_id: String,
}

impl RoleRegistry {
    /// Build a registry; every role must validate and `default_role` must be among them
    pub fn new(roles: Vec<Role>, default_role: &str) -> Result<Self, RegistryError> {
        let mut map = HashMap::with_capacity(roles.len());
        let mut order = Vec::with_capacity(roles.len());

        for role in roles {
            role.validate()?;
            let key = role.id.to_lowercase();
            if map.contains_key(&key) {
                return Err(RegistryError::DuplicateRole(role.id));
            }
            debug!(
                "RoleRegistry: role '{}' ({} / {})",
                role.id, role.provider, role.model.engine
            );
            order.push(role.id.clone());
            map.insert(key, Arc::new(role));
        }

        let default_id = map
            .get(&default_role.to_lowercase())
            .map(|r| r.id.clone())
            .ok_or_else(|| RegistryError::MissingDefault(default_role.to_string()))?;

        info!(
            "RoleRegistry: {} roles loaded, default '{}'",
            order.len(),
            default_id
        );

        Ok(Self {
            roles: map,
            order,
            default_id,
        })
    }

    /// Look up a role by id (case-insensitive). The returned handle is a
    /// snapshot: it stays valid even if the registry is replaced.
    pub fn resolve(&self, id: &str) -> Option<Arc<Role>> {
        self.roles.get(&id.to_lowercase()).cloned()
    }

    /// Canonical ids of every role, in definition order
    pub fn all_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Roles in definition order
    pub fn roles(&self) -> impl Iterator<Item = &Arc<Role>> {
        self.order
            .iter()
            .filter_map(|id| self.roles.get(&id.to_lowercase()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.roles.contains_key(&id.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Id and description of each role, default first
    pub fn summaries(&self) -> Vec<RoleSummary> {
        let mut list: Vec<RoleSummary> = self
            .roles()
            .map(|r| RoleSummary {
                id: r.id.clone(),
                description: r.summary().to_string(),
                provider: r.provider.to_string(),
                engine: r.model.engine.clone(),
                is_default: r.id == self.default_id,
            })
            .collect();
        list.sort_by_key(|s| !s.is_default);
        list
    }
}

impl KnownRoles for RoleRegistry {
    fn canonical_id(&self, name: &str) -> Option<&str> {
        self.roles.get(&name.to_lowercase()).map(|r| r.id.as_str())
    }

    fn default_id(&self) -> &str {
        &self.default_id
    }
}
