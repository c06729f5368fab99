use log::{debug, info, warn};

use crate::api::NoteBackend;
use crate::cache::FallbackCache;
use crate::graph::GraphView;
use crate::models::{Note, NoteDraft, NoteId, NotePatch, OwnerId};


/// Resilient facade over the remote note service and the local fallback cache.
///
/// One API, indifferent to backend availability: every call probes remote
/// health, routes to the HTTP backend when it can, and degrades to the
/// per-owner cache when it cannot. Failures never escape as errors; callers
/// see an empty result, a `false`, or a locally stored note, and can only
/// tell local notes apart by their ID range. The price is that a transient
/// remote failure and genuine emptiness look identical to the caller; that
/// trade-off is deliberate (see DESIGN.md) to keep the conversational layer
/// trivial.
///
/// Handlers receive this by reference; there is no ambient singleton.
pub struct NoteStore {
    backend: Box<dyn NoteBackend>,
    cache: FallbackCache,
}

impl NoteStore {
    /// Creates a store over the given backend with an empty cache.
    pub fn new(backend: Box<dyn NoteBackend>) -> Self {
        Self {
            backend,
            cache: FallbackCache::new(),
        }
    }

    /// Direct cache access, for tests and diagnostics.
    pub fn cache(&self) -> &FallbackCache {
        &self.cache
    }

    /// Reports whether the remote service currently answers its liveness
    /// probe. Purely informational; every operation re-probes for itself.
    pub fn remote_healthy(&self) -> bool {
        self.backend.probe_health()
    }

    /// Creates a note, remotely when possible, locally otherwise.
    ///
    /// A successful remote create invalidates the owner's cache entry so the
    /// next read refetches an authoritative set. Both paths return a full
    /// note; this operation cannot fail.
    pub fn create(&self, draft: NoteDraft) -> Note {
        if self.backend.probe_health() {
            match self.backend.create_note(&draft) {
                Ok(note) => {
                    self.cache.invalidate(draft.owner);
                    return note;
                }
                Err(err) => warn!("remote create failed, storing locally: {err}"),
            }
        } else {
            info!("note service degraded, storing note locally: owner={}", draft.owner);
        }
        self.cache.append_local(draft)
    }

    /// Lists the owner's notes.
    ///
    /// A cache entry takes priority over a fresh remote fetch; that staleness
    /// window is the accepted cost of keeping degraded reads instant. On a
    /// miss with a healthy remote, the result populates the cache. Degraded
    /// misses yield an empty list, never an error.
    pub fn list(&self, owner: OwnerId) -> Vec<Note> {
        if let Some(notes) = self.cache.get(owner) {
            debug!("list served from cache: owner={owner} notes={}", notes.len());
            return notes;
        }
        if self.backend.probe_health() {
            match self.backend.list_notes(owner) {
                Ok(notes) => {
                    self.cache.put(owner, notes.clone());
                    return notes;
                }
                Err(err) => warn!("remote list failed: owner={owner} error={err}"),
            }
        }
        Vec::new()
    }

    /// Case-insensitive substring search over title, content and tags.
    ///
    /// Always computed locally over the owner's note set (cached or freshly
    /// listed); the service's own search endpoint is not consulted.
    pub fn search(&self, owner: OwnerId, query: &str) -> Vec<Note> {
        let needle = query.to_lowercase();
        self.list(owner)
            .into_iter()
            .filter(|note| matches_query(note, &needle))
            .collect()
    }

    /// Fetches a single note, from the cache entry when one exists.
    pub fn get(&self, id: NoteId, owner: OwnerId) -> Option<Note> {
        if let Some(notes) = self.cache.get(owner) {
            return notes.into_iter().find(|note| note.id == id);
        }
        if self.backend.probe_health() {
            match self.backend.get_note(id, owner) {
                Ok(note) => return Some(note),
                Err(err) => warn!("remote get failed: id={id} owner={owner} error={err}"),
            }
        }
        None
    }

    /// Applies a partial update remotely. Updates have no local fallback;
    /// a degraded remote means `false`. Success invalidates the cache.
    pub fn update(&self, id: NoteId, owner: OwnerId, patch: &NotePatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        if self.backend.probe_health() {
            match self.backend.update_note(id, owner, patch) {
                Ok(()) => {
                    self.cache.invalidate(owner);
                    return true;
                }
                Err(err) => warn!("remote update failed: id={id} owner={owner} error={err}"),
            }
        }
        false
    }

    /// Deletes a note, remotely when possible, otherwise from the local
    /// entry. Reports success only when something was actually removed.
    pub fn delete(&self, id: NoteId, owner: OwnerId) -> bool {
        if self.backend.probe_health() {
            match self.backend.delete_note(id, owner) {
                Ok(()) => {
                    self.cache.invalidate(owner);
                    return true;
                }
                Err(err) => warn!("remote delete failed: id={id} owner={owner} error={err}"),
            }
        }
        self.cache.remove_local(owner, id)
    }

    /// Creates a directed link between two of the owner's notes.
    ///
    /// Links live only in the remote store, so a degraded remote means
    /// `false`. Success invalidates the cache entry like any other mutation.
    pub fn link(&self, from: NoteId, to: NoteId, owner: OwnerId) -> bool {
        if self.backend.probe_health() {
            match self.backend.create_link(from, to, owner) {
                Ok(()) => {
                    self.cache.invalidate(owner);
                    return true;
                }
                Err(err) => {
                    warn!("remote link failed: {from}->{to} owner={owner} error={err}")
                }
            }
        }
        false
    }

    /// Builds the owner's graph view.
    ///
    /// Served from the remote store (normalized into the canonical view) when
    /// possible. With a cache entry or a degraded remote, falls back to the
    /// approximate title-overlap view over cached notes; an empty view when
    /// not even those exist.
    pub fn graph(&self, owner: OwnerId) -> GraphView {
        if let Some(notes) = self.cache.get(owner) {
            debug!("graph approximated from cache: owner={owner}");
            return GraphView::approximate_from_notes(&notes);
        }
        if self.backend.probe_health() {
            match self.backend.fetch_graph(owner) {
                Ok(view) => return view,
                Err(err) => warn!("remote graph failed: owner={owner} error={err}"),
            }
        }
        GraphView::default()
    }
}

fn matches_query(note: &Note, needle: &str) -> bool {
    note.title.to_lowercase().contains(needle)
        || note.content.to_lowercase().contains(needle)
        || note
            .tags
            .as_deref()
            .is_some_and(|tags| tags.to_lowercase().contains(needle))
}
