pub mod api;
pub mod cache;
pub mod config;
pub mod dialog;
pub mod graph;
pub mod models;
pub mod store;

pub use api::{ApiClient, ApiClientBuilder, ApiError, NoteBackend};
pub use cache::FallbackCache;
pub use config::Config;
pub use dialog::{DialogStep, DialogStore};
pub use graph::{GraphNode, GraphView};
pub use models::{ChatId, Note, NoteDraft, NoteId, NotePatch, OwnerId};
pub use store::NoteStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builder_accessible_from_crate_root() {
        let client = ApiClientBuilder::new()
            .base_url("http://localhost:8000")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn types_accessible_from_crate_root() {
        let draft = NoteDraft::new(OwnerId::new(1), "title", "content", None);
        assert_eq!(draft.title, "title");

        let cache = FallbackCache::new();
        let note = cache.append_local(draft);
        assert!(FallbackCache::is_local_id(note.id));

        let view = GraphView::approximate_from_notes(&[note]);
        assert_eq!(view.len(), 1);
    }
}
