//! Storage backends.
//!
//! A backend owns persistence of the raw record set and nothing else: it
//! stores whatever note payload it is given (ciphertext for encrypted notes),
//! returns records unordered and never filters. Every variant has the same
//! observable semantics:
//!
//! - ids are assigned at creation and never reused;
//! - `update_note` merges only supplied fields and always advances `updated_at`;
//! - missing records are reported as `None`/`false`, never as errors;
//! - a single corrupt stored record is skipped with a warning by `list_notes`.

mod file_tree;
mod key_value;
mod relational;
mod schema;

pub use file_tree::FileTreeBackend;
pub use key_value::{
    JsonFileKeyValueStore, KeyValueBackend, KeyValueStore, MemoryKeyValueStore,
};
pub use relational::RelationalBackend;

use crate::error::Result;
use crate::models::{Folder, FolderId, FolderUpdate, NewFolder, NewNote, Note, NoteId, NoteUpdate};

/// CRUD contract shared by every storage medium.
///
/// Writes take `&mut self`: the store assumes a single logical writer.
pub trait StorageBackend: Send {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Assigns an id and timestamps, persists and returns the stored record.
    fn create_note(&mut self, note: NewNote) -> Result<Note>;

    /// Returns the note with `id`, or `None`.
    fn get_note(&self, id: NoteId) -> Result<Option<Note>>;

    /// Returns every readable note in no particular order.
    fn list_notes(&self) -> Result<Vec<Note>>;

    /// Merges `update` into the note with `id`. Returns `None` if absent.
    fn update_note(&mut self, id: NoteId, update: NoteUpdate) -> Result<Option<Note>>;

    /// Hard-deletes the note with `id`. Returns whether it existed.
    fn delete_note(&mut self, id: NoteId) -> Result<bool>;

    fn create_folder(&mut self, folder: NewFolder) -> Result<Folder>;

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>>;

    /// Returns every readable folder in no particular order.
    fn list_folders(&self) -> Result<Vec<Folder>>;

    fn update_folder(&mut self, id: FolderId, update: FolderUpdate) -> Result<Option<Folder>>;

    /// Deletes a folder. Referencing notes stay readable: their folder
    /// reference is either nulled or left dangling, per backend.
    fn delete_folder(&mut self, id: FolderId) -> Result<bool>;

    /// Flushes pending state. The backend is dropped afterwards.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBackend")
            .field("name", &self.name())
            .finish()
    }
}

/// Next-id counters persisted by the non-relational backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct Sequence {
    pub next_note: i64,
    pub next_folder: i64,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            next_note: 1,
            next_folder: 1,
        }
    }
}

impl Sequence {
    /// Raises the counters past any id already in use.
    pub fn observe(&mut self, notes: &[Note], folders: &[Folder]) {
        if let Some(max) = notes.iter().map(|n| n.id().get()).max() {
            self.next_note = self.next_note.max(max + 1);
        }
        if let Some(max) = folders.iter().map(|f| f.id().get()).max() {
            self.next_folder = self.next_folder.max(max + 1);
        }
    }

    pub fn take_note_id(&mut self) -> NoteId {
        let id = NoteId::new(self.next_note);
        self.next_note += 1;
        id
    }

    pub fn take_folder_id(&mut self) -> FolderId {
        let id = FolderId::new(self.next_folder);
        self.next_folder += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoteBuilder;

    #[test]
    fn sequence_starts_at_one() {
        let mut seq = Sequence::default();
        assert_eq!(seq.take_note_id(), NoteId::new(1));
        assert_eq!(seq.take_note_id(), NoteId::new(2));
        assert_eq!(seq.take_folder_id(), FolderId::new(1));
    }

    #[test]
    fn sequence_observe_skips_existing_ids() {
        let mut seq = Sequence::default();
        let notes = vec![NoteBuilder::new().id(NoteId::new(41)).build()];
        seq.observe(&notes, &[]);

        assert_eq!(seq.take_note_id(), NoteId::new(42));
        assert_eq!(seq.take_folder_id(), FolderId::new(1));
    }

    #[test]
    fn sequence_observe_never_moves_backwards() {
        let mut seq = Sequence {
            next_note: 100,
            next_folder: 5,
        };
        let notes = vec![NoteBuilder::new().id(NoteId::new(3)).build()];
        seq.observe(&notes, &[]);

        assert_eq!(seq.next_note, 100);
    }
}
