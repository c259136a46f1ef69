//! chatguys-core - Mention routing and shared-history dispatch
//!
//! This crate provides:
//! - Mention parsing that splits one input line into per-role segments
//! - A role registry with credentials resolved per role
//! - The shared, append-only conversation transcript
//! - Concurrent dispatch to OpenAI-compatible, search-augmented and Anthropic endpoints
//! - Provider reply normalization, with citations kept apart from prose
//! - The `ChatSession` facade driven by the CLI

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod mention;
pub mod providers;
pub mod roles;
pub mod session;
pub mod transcript;
pub mod types;

// Re-export main types for convenience
pub use dispatcher::{DispatchConfig, Dispatcher};
pub use error::{DispatchError, RegistryError, StoreError};
pub use mention::MentionParser;
pub use providers::{ChatRequest, HttpEndpoint, ModelEndpoint, NormalizedReply, ResponseNormalizer};
pub use roles::{Credentials, KnownRoles, ModelParams, ProviderKind, Role, RoleRegistry, RoleSummary};
pub use session::{ChatSession, LineOutcome};
pub use transcript::{ConversationStore, Transcript};
pub use types::{Citation, EntryKind, MentionSegment, NewEntry, Speaker, TranscriptEntry};
