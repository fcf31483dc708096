use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::FolderId;
use super::note::advance_timestamp;

/// A named grouping for notes.
///
/// Folder names are not required to be unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    id: FolderId,
    name: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Folder {
    /// Creates a folder record.
    pub fn new(
        id: FolderId,
        name: impl Into<String>,
        color: Option<String>,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            color,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> FolderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub(crate) fn with_id(mut self, id: FolderId) -> Self {
        self.id = id;
        self
    }

    pub(crate) fn apply(&mut self, update: FolderUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(color) = update.color {
            self.color = color;
        }
        self.updated_at = advance_timestamp(self.updated_at);
    }
}

/// Input for creating a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewFolder {
    pub name: String,
    pub color: Option<String>,
}

impl NewFolder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub(crate) fn into_folder(self, id: FolderId) -> Folder {
        let now = OffsetDateTime::now_utc();
        Folder::new(id, self.name, self.color, now, now)
    }
}

/// Partial update for a folder. `color: Some(None)` clears the color.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderUpdate {
    pub name: Option<String>,
    pub color: Option<Option<String>>,
}
