/// Per-owner local note store.
///
/// Doubles as a read-through cache of remote results and as the write-behind
/// buffer for notes created while the remote store is degraded. An owner's
/// entry is either absent (remote is authoritative) or present (this copy is
/// authoritative until the next invalidation). Mutations that succeed
/// remotely must invalidate before anything repopulates, never the reverse,
/// so no reader observes pre-write data after the write.
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use log::debug;
use time::OffsetDateTime;

use crate::models::{Note, NoteDraft, NoteId, OwnerId};

/// Locally assigned note IDs start here. SQLite rowids on the service side
/// grow from 1, so the two ID spaces can never collide within one owner's
/// note set.
pub const LOCAL_ID_BASE: i64 = 1_000_000_000_000;

/// Shared, concurrently accessible note cache keyed by owner.
///
/// Backed by a sharded map: mutations to one owner's entry are mutually
/// exclusive while reads of other owners proceed unblocked, which is exactly
/// the discipline a webhook-driven (parallel) transport needs.
pub struct FallbackCache {
    entries: DashMap<OwnerId, Vec<Note>>,
    next_local_id: AtomicI64,
}

impl FallbackCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_local_id: AtomicI64::new(LOCAL_ID_BASE),
        }
    }

    /// Returns the owner's cached notes, or `None` on a cache miss.
    pub fn get(&self, owner: OwnerId) -> Option<Vec<Note>> {
        self.entries.get(&owner).map(|entry| entry.value().clone())
    }

    /// Replaces the owner's entry with a fresh remote result.
    pub fn put(&self, owner: OwnerId, notes: Vec<Note>) {
        debug!("cache populated: owner={owner} notes={}", notes.len());
        self.entries.insert(owner, notes);
    }

    /// Drops the owner's entry so the next read is authoritative.
    pub fn invalidate(&self, owner: OwnerId) {
        if self.entries.remove(&owner).is_some() {
            debug!("cache invalidated: owner={owner}");
        }
    }

    /// Stores a note locally under a freshly assigned local ID.
    ///
    /// Creates the owner's entry if absent, so a degraded `create` followed
    /// by a degraded `list` still surfaces the note.
    pub fn append_local(&self, draft: NoteDraft) -> Note {
        let id = NoteId::new(self.next_local_id.fetch_add(1, Ordering::SeqCst));
        let note = Note {
            id,
            owner: draft.owner,
            title: draft.title,
            content: draft.content,
            tags: draft.tags,
            created_at: OffsetDateTime::now_utc(),
        };
        debug!("note stored locally: id={id} owner={}", note.owner);
        self.entries
            .entry(note.owner)
            .or_insert_with(Vec::new)
            .push(note.clone());
        note
    }

    /// Removes a note from the owner's entry. Returns whether anything was
    /// actually removed; a miss is the caller's signal that the degraded
    /// delete found nothing to delete.
    pub fn remove_local(&self, owner: OwnerId, id: NoteId) -> bool {
        match self.entries.get_mut(&owner) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|note| note.id != id);
                let removed = entry.len() != before;
                if removed {
                    debug!("note removed locally: id={id} owner={owner}");
                }
                removed
            }
            None => false,
        }
    }

    /// Whether an ID came from the local generator rather than the service.
    pub fn is_local_id(id: NoteId) -> bool {
        id.get() >= LOCAL_ID_BASE
    }
}

impl Default for FallbackCache {
    fn default() -> Self {
        Self::new()
    }
}
