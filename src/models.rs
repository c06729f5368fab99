mod ids;
mod note;

pub use ids::{ChatId, NoteId, OwnerId};
pub use note::{Note, NoteDraft, NotePatch};
