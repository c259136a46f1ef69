//! The shared, append-only conversation transcript

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{NewEntry, Speaker, TranscriptEntry};

/// Single ordered log of user segments and agent replies for one session.
///
/// Appends are serialized by one mutex and take O(1); entries are never
/// edited after append. `reset` empties the log, restarts sequence numbers at
/// zero and bumps the generation so late replies from before the reset can be
/// recognized and dropped.
#[derive(Debug)]
pub struct ConversationStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: Vec<Arc<TranscriptEntry>>,
    next_seq: u64,
    generation: u64,
    /// Lowercased ids of roles allowed to speak
    known_roles: HashSet<String>,
}

/// Consistent, immutable view of the transcript at one moment
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    generation: u64,
    entries: Vec<Arc<TranscriptEntry>>,
}

impl Transcript {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[Arc<TranscriptEntry>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConversationStore {
    /// Create an empty store whose non-user speakers must be one of `role_ids`
    pub fn new<I, S>(role_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = Self {
            inner: Mutex::new(StoreInner::default()),
        };
        store.set_known_roles(role_ids);
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Entries are only pushed after being fully built, so a poisoned
        // guard still holds a consistent log.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the set of roles allowed to speak (used on registry reload)
    pub fn set_known_roles<I, S>(&self, role_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known: HashSet<String> = role_ids
            .into_iter()
            .map(|id| id.as_ref().to_lowercase())
            .collect();
        debug!("ConversationStore: {} known roles", known.len());
        self.lock().known_roles = known;
    }

    /// Append to the current generation
    pub fn append(&self, entry: NewEntry) -> Result<Arc<TranscriptEntry>, StoreError> {
        let mut inner = self.lock();
        let generation = inner.generation;
        Self::append_locked(&mut inner, generation, entry)
    }

    /// Append only if the store is still at `generation`; a reset in between
    /// makes this a [`StoreError::StaleGeneration`] and nothing is written.
    pub fn append_in(
        &self,
        generation: u64,
        entry: NewEntry,
    ) -> Result<Arc<TranscriptEntry>, StoreError> {
        let mut inner = self.lock();
        Self::append_locked(&mut inner, generation, entry)
    }

    fn append_locked(
        inner: &mut StoreInner,
        generation: u64,
        entry: NewEntry,
    ) -> Result<Arc<TranscriptEntry>, StoreError> {
        if generation != inner.generation {
            return Err(StoreError::StaleGeneration {
                started: generation,
                current: inner.generation,
            });
        }
        if let Speaker::Role(id) = &entry.speaker {
            if !inner.known_roles.contains(&id.to_lowercase()) {
                return Err(StoreError::UnknownSpeaker(id.clone()));
            }
        }

        let record = Arc::new(TranscriptEntry {
            seq: inner.next_seq,
            speaker: entry.speaker,
            text: entry.text,
            kind: entry.kind,
            addressed_to: entry.addressed_to,
            citations: entry.citations,
            timestamp: Utc::now(),
        });
        inner.next_seq += 1;
        inner.entries.push(record.clone());
        debug!(
            "ConversationStore: appended #{} from {} ({} chars)",
            record.seq,
            record.speaker,
            record.text.len()
        );
        Ok(record)
    }

    /// Clear every entry and restart numbering. Returns the new generation.
    pub fn reset(&self) -> u64 {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.next_seq = 0;
        inner.generation += 1;
        info!(
            "ConversationStore: reset ({} entries cleared, generation {})",
            dropped, inner.generation
        );
        inner.generation
    }

    pub fn snapshot(&self) -> Transcript {
        let inner = self.lock();
        Transcript {
            generation: inner.generation,
            entries: inner.entries.clone(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}
