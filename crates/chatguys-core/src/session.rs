//! Chat session: the entry points the outer application drives

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::dispatcher::{DispatchConfig, Dispatcher};
use crate::mention::MentionParser;
use crate::providers::ModelEndpoint;
use crate::roles::{RoleRegistry, RoleSummary};
use crate::transcript::{ConversationStore, Transcript};
use crate::types::{MentionSegment, TranscriptEntry};

/// What one input line produced
#[derive(Debug, Clone, Default)]
pub struct LineOutcome {
    pub segments: Vec<MentionSegment>,
    /// Entries appended by this line, in sequence order
    pub entries: Vec<Arc<TranscriptEntry>>,
}

impl LineOutcome {
    /// Agent entries (replies and error markers)
    pub fn replies(&self) -> impl Iterator<Item = &Arc<TranscriptEntry>> {
        self.entries.iter().filter(|e| !e.speaker.is_user())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One conversation: a role registry, a transcript and a dispatcher.
///
/// Lines are processed one at a time. `reset` and `reload` wait for the
/// line in flight to finish (or time out) before they take effect.
pub struct ChatSession {
    registry: RwLock<Arc<RoleRegistry>>,
    store: ConversationStore,
    dispatcher: Dispatcher,
    parser: MentionParser,
    turn: Mutex<()>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("roles", &self.registry().all_ids())
            .field("entries", &self.store.len())
            .field("marker", &self.parser.marker())
            .finish()
    }
}

impl ChatSession {
    pub fn new(
        registry: RoleRegistry,
        endpoint: Arc<dyn ModelEndpoint>,
        config: DispatchConfig,
    ) -> Self {
        let store = ConversationStore::new(registry.all_ids());
        Self {
            registry: RwLock::new(Arc::new(registry)),
            store,
            dispatcher: Dispatcher::new(endpoint, config),
            parser: MentionParser::default(),
            turn: Mutex::new(()),
        }
    }

    pub fn with_marker(mut self, marker: char) -> Self {
        self.parser = MentionParser::new(marker);
        self
    }

    /// Current registry snapshot
    pub fn registry(&self) -> Arc<RoleRegistry> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Parse and dispatch one line. Never fails; a blank line does nothing.
    pub async fn handle_line(&self, line: &str) -> LineOutcome {
        let _turn = self.turn.lock().await;
        let registry = self.registry();

        let segments = self.parser.parse(line, registry.as_ref());
        if segments.is_empty() {
            return LineOutcome::default();
        }
        debug!(
            "Line split into {} segment(s): {:?}",
            segments.len(),
            segments.iter().map(|s| &s.roles).collect::<Vec<_>>()
        );

        let entries = self
            .dispatcher
            .dispatch(&segments, &registry, &self.store)
            .await;
        LineOutcome { segments, entries }
    }

    /// Clear the transcript once the line in flight has finished
    pub async fn reset(&self) {
        let _turn = self.turn.lock().await;
        self.store.reset();
    }

    /// Swap in a new registry once the line in flight has finished.
    /// Existing transcript entries are kept.
    pub async fn reload(&self, registry: RoleRegistry) {
        let _turn = self.turn.lock().await;
        self.store.set_known_roles(registry.all_ids());
        let count = registry.len();
        *self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(registry);
        info!("Reloaded role registry ({} roles)", count);
    }

    pub fn list_roles(&self) -> Vec<RoleSummary> {
        self.registry().summaries()
    }

    pub fn snapshot(&self) -> Transcript {
        self.store.snapshot()
    }
}
