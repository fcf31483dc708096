use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::{FolderId, NoteId};
use crate::error::{Result, StoreError};

/// A persisted unit of text content.
///
/// Notes are the primary record of the store. The `content` seen by callers
/// of [`crate::NoteStore`] is always plaintext; backends hold whatever payload
/// the facade hands them, which is ciphertext when `encrypted` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    id: NoteId,
    title: String,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    folder_id: Option<FolderId>,
    #[serde(default)]
    encrypted: bool,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Note {
    /// Returns the note's unique identifier.
    pub fn id(&self) -> NoteId {
        self.id
    }

    /// Returns the note's title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the note's content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the note's tags in display order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns true if the note carries `tag` (exact match).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Returns whether the note is pinned.
    pub fn pinned(&self) -> bool {
        self.pinned
    }

    /// Returns the folder this note refers to, if any.
    ///
    /// The folder may no longer exist.
    pub fn folder_id(&self) -> Option<FolderId> {
        self.folder_id
    }

    /// Returns whether the note body is encrypted at rest.
    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    /// Returns when this note was created.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Returns when this note was last mutated.
    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub(crate) fn with_id(mut self, id: NoteId) -> Self {
        self.id = id;
        self
    }

    pub(crate) fn set_content(&mut self, content: String) {
        self.content = content;
    }

    /// Merges the supplied fields of `update` into this note.
    ///
    /// Omitted fields keep their value; `updated_at` always advances.
    pub(crate) fn apply(&mut self, update: NoteUpdate) -> Result<()> {
        let NoteUpdate {
            title,
            content,
            tags,
            pinned,
            folder_id,
            encrypted,
        } = update;

        if let Some(tags) = tags {
            self.tags = normalize_tags(tags)?;
        }
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(content) = content {
            self.content = content;
        }
        if let Some(pinned) = pinned {
            self.pinned = pinned;
        }
        if let Some(folder_id) = folder_id {
            self.folder_id = folder_id;
        }
        if let Some(encrypted) = encrypted {
            self.encrypted = encrypted;
        }
        self.updated_at = advance_timestamp(self.updated_at);
        Ok(())
    }
}

/// Builder for constructing `Note` instances with optional fields.
///
/// # Examples
///
/// ```
/// use notekeep::{NoteBuilder, NoteId};
///
/// let note = NoteBuilder::new()
///     .id(NoteId::new(1))
///     .title("Groceries")
///     .content("eggs, milk")
///     .build();
///
/// assert_eq!(note.id(), NoteId::new(1));
/// assert_eq!(note.title(), "Groceries");
/// assert!(note.tags().is_empty());
/// assert!(!note.pinned());
/// ```
#[derive(Debug, Default)]
pub struct NoteBuilder {
    id: Option<NoteId>,
    title: Option<String>,
    content: Option<String>,
    tags: Option<Vec<String>>,
    pinned: bool,
    folder_id: Option<FolderId>,
    encrypted: bool,
    created_at: Option<OffsetDateTime>,
    updated_at: Option<OffsetDateTime>,
}

impl NoteBuilder {
    /// Creates a new `NoteBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the note ID.
    pub fn id(mut self, id: NoteId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the note title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the note content.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the tags. No normalization is applied here.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the pinned flag.
    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Sets the folder reference.
    pub fn folder_id(mut self, folder_id: Option<FolderId>) -> Self {
        self.folder_id = folder_id;
        self
    }

    /// Sets the encrypted flag.
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Sets the created timestamp.
    pub fn created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Sets the updated timestamp.
    pub fn updated_at(mut self, updated_at: OffsetDateTime) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Builds the `Note`, using defaults for optional fields.
    ///
    /// Title and content default to the empty string; both timestamps
    /// default to now.
    ///
    /// # Panics
    ///
    /// Panics if `id` has not been set.
    pub fn build(self) -> Note {
        let now = OffsetDateTime::now_utc();
        let created_at = self.created_at.unwrap_or(now);
        Note {
            id: self.id.expect("id is required"),
            title: self.title.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            pinned: self.pinned,
            folder_id: self.folder_id,
            encrypted: self.encrypted,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

/// Input for creating a note. The store assigns the id.
///
/// `created_at`/`updated_at` are normally left empty; importers set them to
/// carry timestamps over from an external record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub folder_id: Option<FolderId>,
    pub encrypted: bool,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

impl NewNote {
    /// Creates input for a plain note with the given title and content.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Sets the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the pinned flag.
    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Places the note in a folder.
    pub fn in_folder(mut self, folder_id: FolderId) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    /// Requests encryption of the body at rest.
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Turns this input into a stored record with the given id.
    ///
    /// Validates and normalizes tags.
    pub(crate) fn into_note(self, id: NoteId) -> Result<Note> {
        let tags = normalize_tags(self.tags)?;
        let now = OffsetDateTime::now_utc();
        let created_at = self.created_at.unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(created_at).max(created_at);

        Ok(Note {
            id,
            title: self.title,
            content: self.content,
            tags,
            pinned: self.pinned,
            folder_id: self.folder_id,
            encrypted: self.encrypted,
            created_at,
            updated_at,
        })
    }
}

impl From<Note> for NewNote {
    /// Carries an external record over, dropping its id.
    fn from(note: Note) -> Self {
        Self {
            title: note.title,
            content: note.content,
            tags: note.tags,
            pinned: note.pinned,
            folder_id: note.folder_id,
            encrypted: note.encrypted,
            created_at: Some(note.created_at),
            updated_at: Some(note.updated_at),
        }
    }
}

/// Partial update for a note. `None` fields are left untouched.
///
/// `folder_id` is doubly optional: `Some(None)` moves the note out of its
/// folder, `None` leaves the folder as is.
///
/// # Examples
///
/// ```
/// use notekeep::NoteUpdate;
///
/// let update = NoteUpdate::default().pinned(true);
/// assert_eq!(update.pinned, Some(true));
/// assert!(update.title.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub pinned: Option<bool>,
    pub folder_id: Option<Option<FolderId>>,
    pub encrypted: Option<bool>,
}

impl NoteUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    pub fn folder_id(mut self, folder_id: Option<FolderId>) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = Some(encrypted);
        self
    }

    /// Returns true if no field is supplied.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Normalizes a note's tag list into a well-formed set.
///
/// Trims each name, rejects empty names and collapses duplicates while
/// keeping first-occurrence order.
pub fn normalize_tags<I, S>(tags: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() {
            return Err(StoreError::Validation(
                "tag names cannot be empty".to_string(),
            ));
        }
        if !normalized.iter().any(|t| t == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    Ok(normalized)
}

/// Returns a timestamp strictly later than `previous`, preferring now.
pub(crate) fn advance_timestamp(previous: OffsetDateTime) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    if now > previous {
        now
    } else {
        previous + Duration::nanoseconds(1)
    }
}
