/// Multi-step note entry, one state machine per conversation.
///
/// A note is collected across three turns (title, content, tags) keyed by the
/// chat the messages arrive in. Cancellation is accepted at any point and
/// discards everything collected so far. Starting a new entry while one is in
/// progress silently replaces it; a chat never stacks sessions.
use dashmap::DashMap;
use log::{debug, info};

use crate::models::{ChatId, Note, NoteDraft, OwnerId};
use crate::store::NoteStore;

/// Command that aborts an in-progress entry from any phase.
pub const CANCEL_COMMAND: &str = "/cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    AwaitingTitle,
    AwaitingContent { title: String },
    AwaitingTags { title: String, content: String },
}

/// What the front-end should do after feeding a message to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogStep {
    /// No entry in progress for this chat; the message was not consumed.
    NotActive,
    /// Entry (re)started; ask the user for a title.
    PromptTitle,
    /// Title accepted; ask for the content.
    PromptContent,
    /// Content accepted; ask for tags (blank means none).
    PromptTags,
    /// Blank input where a non-empty field is required; re-ask the same field.
    RejectedEmpty,
    /// Entry aborted, collected fields discarded.
    Cancelled,
    /// The note was handed to the store. Always yields a note: the resilient
    /// facade degrades to local storage instead of failing. Check the ID
    /// range to tell the user where it landed.
    Committed(Note),
}

/// Per-conversation entry state, shared across handler threads.
///
/// Same concurrency discipline as the cache: one chat's state mutates under
/// its shard lock, different chats never block each other.
pub struct DialogStore {
    sessions: DashMap<ChatId, Phase>,
}

impl DialogStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Starts (or restarts) note entry for a chat.
    pub fn begin(&self, chat: ChatId) -> DialogStep {
        if self.sessions.insert(chat, Phase::AwaitingTitle).is_some() {
            debug!("dialog restarted, previous entry discarded: chat={chat}");
        }
        DialogStep::PromptTitle
    }

    /// Whether a note entry is in progress for this chat.
    pub fn is_active(&self, chat: ChatId) -> bool {
        self.sessions.contains_key(&chat)
    }

    /// Aborts the chat's entry if one is in progress.
    pub fn cancel(&self, chat: ChatId) -> bool {
        self.sessions.remove(&chat).is_some()
    }

    /// Feeds one message into the chat's state machine.
    ///
    /// On the final (tags) input the accumulated draft goes to
    /// [`NoteStore::create`] exactly once and the machine returns to idle;
    /// there is no automatic retry.
    pub fn handle_message(
        &self,
        chat: ChatId,
        owner: OwnerId,
        text: &str,
        store: &NoteStore,
    ) -> DialogStep {
        // Clone out and drop the shard guard before any re-entry on this key.
        let Some(phase) = self.sessions.get(&chat).map(|entry| entry.value().clone()) else {
            return DialogStep::NotActive;
        };

        if is_cancel(text) {
            self.sessions.remove(&chat);
            info!("note entry cancelled: chat={chat}");
            return DialogStep::Cancelled;
        }

        let trimmed = text.trim();
        match phase {
            Phase::AwaitingTitle => {
                if trimmed.is_empty() {
                    return DialogStep::RejectedEmpty;
                }
                self.sessions.insert(
                    chat,
                    Phase::AwaitingContent {
                        title: trimmed.to_string(),
                    },
                );
                DialogStep::PromptContent
            }
            Phase::AwaitingContent { title } => {
                if trimmed.is_empty() {
                    return DialogStep::RejectedEmpty;
                }
                self.sessions.insert(
                    chat,
                    Phase::AwaitingTags {
                        title,
                        content: trimmed.to_string(),
                    },
                );
                DialogStep::PromptTags
            }
            Phase::AwaitingTags { title, content } => {
                // Back to idle before the create attempt; outcome does not
                // resurrect the entry.
                self.sessions.remove(&chat);
                let tags = if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                };
                let note = store.create(NoteDraft::new(owner, title, content, tags));
                info!("note entry committed: chat={chat} note={}", note.id);
                DialogStep::Committed(note)
            }
        }
    }
}

impl Default for DialogStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cancel(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed == CANCEL_COMMAND || trimmed.eq_ignore_ascii_case("cancel")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, NoteBackend};
    use crate::cache::FallbackCache;
    use crate::graph::GraphView;
    use crate::models::{NoteId, NotePatch};

    /// Backend that never answers: every note the dialog commits lands in
    /// the local cache, which keeps these tests entirely offline.
    struct DeadBackend;

    impl NoteBackend for DeadBackend {
        fn create_note(&self, _: &NoteDraft) -> Result<Note, ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn list_notes(&self, _: OwnerId) -> Result<Vec<Note>, ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn search_notes(&self, _: OwnerId, _: &str) -> Result<Vec<Note>, ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn get_note(&self, _: NoteId, _: OwnerId) -> Result<Note, ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn update_note(&self, _: NoteId, _: OwnerId, _: &NotePatch) -> Result<(), ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn delete_note(&self, _: NoteId, _: OwnerId) -> Result<(), ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn create_link(&self, _: NoteId, _: NoteId, _: OwnerId) -> Result<(), ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn fetch_graph(&self, _: OwnerId) -> Result<GraphView, ApiError> {
            Err(ApiError::Http { status: 503 })
        }
        fn probe_health(&self) -> bool {
            false
        }
    }

    fn fixtures() -> (DialogStore, NoteStore, ChatId, OwnerId) {
        (
            DialogStore::new(),
            NoteStore::new(Box::new(DeadBackend)),
            ChatId::new(100),
            OwnerId::new(1),
        )
    }

    #[test]
    fn full_flow_commits_exactly_one_note() {
        let (dialog, store, chat, owner) = fixtures();

        assert_eq!(dialog.begin(chat), DialogStep::PromptTitle);
        assert_eq!(
            dialog.handle_message(chat, owner, "My title", &store),
            DialogStep::PromptContent
        );
        assert_eq!(
            dialog.handle_message(chat, owner, "My content", &store),
            DialogStep::PromptTags
        );

        let step = dialog.handle_message(chat, owner, "tag1, tag2", &store);
        let DialogStep::Committed(note) = step else {
            panic!("expected commit, got {step:?}");
        };
        assert_eq!(note.title, "My title");
        assert_eq!(note.content, "My content");
        assert_eq!(note.tags.as_deref(), Some("tag1, tag2"));

        assert!(!dialog.is_active(chat), "machine returns to idle");
        assert_eq!(store.list(owner).len(), 1, "exactly one note created");
    }

    #[test]
    fn blank_tags_input_commits_with_no_tags() {
        let (dialog, store, chat, owner) = fixtures();

        dialog.begin(chat);
        dialog.handle_message(chat, owner, "T", &store);
        dialog.handle_message(chat, owner, "C", &store);
        let step = dialog.handle_message(chat, owner, "   ", &store);

        let DialogStep::Committed(note) = step else {
            panic!("expected commit, got {step:?}");
        };
        assert_eq!(note.tags, None);
    }

    #[test]
    fn cancel_from_content_phase_discards_everything() {
        let (dialog, store, chat, owner) = fixtures();

        dialog.begin(chat);
        dialog.handle_message(chat, owner, "T", &store);
        assert_eq!(
            dialog.handle_message(chat, owner, "/cancel", &store),
            DialogStep::Cancelled
        );

        assert!(!dialog.is_active(chat));
        assert!(store.list(owner).is_empty(), "no note may be created");
    }

    #[test]
    fn cancel_is_accepted_in_every_phase_and_spelling() {
        let (dialog, store, chat, owner) = fixtures();

        dialog.begin(chat);
        assert_eq!(
            dialog.handle_message(chat, owner, "CANCEL", &store),
            DialogStep::Cancelled
        );

        dialog.begin(chat);
        dialog.handle_message(chat, owner, "T", &store);
        dialog.handle_message(chat, owner, "C", &store);
        assert_eq!(
            dialog.handle_message(chat, owner, " cancel ", &store),
            DialogStep::Cancelled
        );
        assert!(store.list(owner).is_empty());
    }

    #[test]
    fn message_without_active_entry_is_not_consumed() {
        let (dialog, store, chat, owner) = fixtures();

        assert_eq!(
            dialog.handle_message(chat, owner, "hello", &store),
            DialogStep::NotActive
        );
    }

    #[test]
    fn blank_title_and_content_are_rejected_and_re_prompted() {
        let (dialog, store, chat, owner) = fixtures();

        dialog.begin(chat);
        assert_eq!(
            dialog.handle_message(chat, owner, "   ", &store),
            DialogStep::RejectedEmpty
        );
        assert_eq!(
            dialog.handle_message(chat, owner, "T", &store),
            DialogStep::PromptContent,
            "machine must still be waiting for the title"
        );
        assert_eq!(
            dialog.handle_message(chat, owner, "", &store),
            DialogStep::RejectedEmpty
        );
    }

    #[test]
    fn begin_overwrites_an_entry_in_progress() {
        let (dialog, store, chat, owner) = fixtures();

        dialog.begin(chat);
        dialog.handle_message(chat, owner, "old title", &store);

        // Fresh "new note" intent: collected fields are gone.
        dialog.begin(chat);
        dialog.handle_message(chat, owner, "new title", &store);
        dialog.handle_message(chat, owner, "content", &store);
        let step = dialog.handle_message(chat, owner, "", &store);

        let DialogStep::Committed(note) = step else {
            panic!("expected commit, got {step:?}");
        };
        assert_eq!(note.title, "new title");
    }

    #[test]
    fn chats_do_not_share_entry_state() {
        let (dialog, store, _, owner) = fixtures();
        let (a, b) = (ChatId::new(1), ChatId::new(2));

        dialog.begin(a);
        dialog.begin(b);
        dialog.handle_message(a, owner, "from a", &store);
        dialog.handle_message(b, owner, "from b", &store);
        dialog.handle_message(a, owner, "content a", &store);

        assert_eq!(
            dialog.handle_message(a, owner, "", &store),
            DialogStep::Committed(store.list(owner)[0].clone())
        );
        assert!(dialog.is_active(b), "chat b is still collecting");
    }

    #[test]
    fn title_and_content_are_trimmed() {
        let (dialog, store, chat, owner) = fixtures();

        dialog.begin(chat);
        dialog.handle_message(chat, owner, "  spaced title  ", &store);
        dialog.handle_message(chat, owner, "  spaced content  ", &store);
        let step = dialog.handle_message(chat, owner, "", &store);

        let DialogStep::Committed(note) = step else {
            panic!("expected commit, got {step:?}");
        };
        assert_eq!(note.title, "spaced title");
        assert_eq!(note.content, "spaced content");
    }
}
