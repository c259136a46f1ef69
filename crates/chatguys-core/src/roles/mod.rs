//! Named agent configurations and the registry that holds them
//!
//! A [`Role`] carries the prompt, model parameters, provider kind and resolved
//! credentials of one agent. A [`RoleRegistry`] is an immutable set of roles
//! with a designated default; sessions swap whole registries on reload.

pub mod profile;
pub mod registry;

pub use profile::{Credentials, ModelParams, ProviderKind, Role, mask_secret};
pub use registry::{KnownRoles, RoleRegistry, RoleSummary};
