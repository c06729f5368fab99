use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{NoteId, OwnerId};

/// A short text note owned by a single user.
///
/// Notes are created through the conversational flow or directly via the CLI.
/// The `id` is assigned by the remote storage service on create and is
/// immutable afterwards; notes stored locally during degraded operation carry
/// IDs from a disjoint range so the two can never collide in one owner's set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Storage-assigned (or locally assigned) identifier.
    pub id: NoteId,
    /// The user this note belongs to. Notes are never shared.
    #[serde(rename = "user_id")]
    pub owner: OwnerId,
    /// Title, non-empty.
    pub title: String,
    /// Body text, non-empty.
    pub content: String,
    /// Optional comma-separated tag string, kept verbatim.
    #[serde(default)]
    pub tags: Option<String>,
    /// When this note was created.
    #[serde(with = "timestamp", default = "OffsetDateTime::now_utc")]
    pub created_at: OffsetDateTime,
}

impl Note {
    /// Returns a short preview of the content for graph display.
    pub fn content_preview(&self) -> String {
        const PREVIEW_LEN: usize = 40;
        if self.content.chars().count() <= PREVIEW_LEN {
            self.content.clone()
        } else {
            let mut preview: String = self.content.chars().take(PREVIEW_LEN).collect();
            preview.push('…');
            preview
        }
    }
}

/// The fields of a note before storage has assigned an identifier.
///
/// Produced by the conversation state machine and consumed by
/// [`crate::store::NoteStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub owner: OwnerId,
    pub title: String,
    pub content: String,
    pub tags: Option<String>,
}

impl NoteDraft {
    pub fn new(
        owner: OwnerId,
        title: impl Into<String>,
        content: impl Into<String>,
        tags: Option<String>,
    ) -> Self {
        Self {
            owner,
            title: title.into(),
            content: content.into(),
            tags,
        }
    }
}

/// Partial update for an existing note. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<String>,
}

impl NotePatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none()
    }
}

/// Lenient timestamp (de)serialization for the remote service.
///
/// The service emits RFC 3339 in newer deployments but plain SQLite
/// `YYYY-MM-DD HH:MM:SS` (UTC implied) from `CURRENT_TIMESTAMP` columns.
/// Accept both on the way in; always write RFC 3339 on the way out.
pub(crate) mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S>(dt: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = dt.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(dt) = OffsetDateTime::parse(&raw, &Rfc3339) {
            return Ok(dt);
        }
        let sqlite = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        PrimitiveDateTime::parse(&raw, &sqlite)
            .map(|dt| dt.assume_utc())
            .map_err(serde::de::Error::custom)
    }
}
