//! The note store facade.
//!
//! [`NoteStore`] composes one [`StorageBackend`], the encryption codec and the
//! query engine into the surface the rest of an application calls. Writes
//! flow store → codec → backend; reads flow backend → codec → query → caller.
//! Backends only ever see the payload to persist, which is ciphertext for
//! encrypted notes.

use std::fs;

use log::{debug, info, warn};

use crate::backend::{FileTreeBackend, KeyValueBackend, RelationalBackend, StorageBackend};
use crate::codec::{self, DECRYPTION_PLACEHOLDER, SessionKey};
use crate::config::{BackendKind, StoreConfig};
use crate::error::{Result, StoreError};
use crate::models::{
    Folder, FolderId, FolderUpdate, NewFolder, NewNote, Note, NoteId, NoteUpdate, Tag,
};
use crate::query::{self, NoteFilter};

/// Caller-owned handle over one backend and an optional session key.
///
/// # Examples
///
/// ```
/// use notekeep::{NewNote, NoteFilter, NoteStore};
///
/// # fn main() -> notekeep::Result<()> {
/// let mut store = NoteStore::in_memory();
/// store.set_key("correct horse")?;
///
/// store.create_note(NewNote::new("Plain", "visible").with_tags(["todo"]))?;
/// let secret = store.create_note(NewNote::new("Secret", "hidden").encrypted(true))?;
/// assert_eq!(secret.content(), "hidden");
///
/// let notes = store.list_notes(&NoteFilter::default())?;
/// assert_eq!(notes.len(), 2);
/// assert_eq!(store.tags()?[0].name(), "todo");
///
/// store.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct NoteStore {
    backend: Box<dyn StorageBackend>,
    key: Option<SessionKey>,
}

impl NoteStore {
    /// Opens the backend named by `config`, creating its files as needed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let backend: Box<dyn StorageBackend> = match config.backend {
            BackendKind::KeyValue => Box::new(KeyValueBackend::open(config.key_value_path())?),
            BackendKind::FileTree => Box::new(FileTreeBackend::open(config.tree_root())?),
            BackendKind::Relational => {
                Box::new(RelationalBackend::open(config.database_path())?)
            }
        };

        info!(
            "Opened {} store in {}",
            config.backend,
            config.data_dir.display()
        );
        Ok(Self::with_backend(backend))
    }

    /// Creates an ephemeral store over an in-memory key-value backend.
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(KeyValueBackend::in_memory()))
    }

    /// Wraps an already constructed backend.
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend, key: None }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Flushes and releases the backend. The session key is zeroized.
    pub fn close(mut self) -> Result<()> {
        self.key = None;
        self.backend.close()?;
        debug!("Closed {} store", self.backend.name());
        Ok(())
    }

    /// Sets the session key used to encrypt and decrypt note bodies.
    ///
    /// The key is held in memory only.
    pub fn set_key(&mut self, key: &str) -> Result<()> {
        self.key = Some(SessionKey::new(key)?);
        Ok(())
    }

    /// Forgets the session key.
    pub fn clear_key(&mut self) {
        self.key = None;
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Creates a note. Encrypted notes are sealed before they reach the backend.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingKey` if the note is flagged encrypted and
    /// no key is set; nothing is written in that case.
    pub fn create_note(&mut self, mut note: NewNote) -> Result<Note> {
        let plaintext = note.content.clone();
        if note.encrypted {
            note.content = self.seal(&plaintext, None)?;
        }

        let mut created = self.backend.create_note(note)?;
        created.set_content(plaintext);
        debug!("Created note {} ({})", created.id(), self.backend.name());
        Ok(created)
    }

    /// Returns the note with `id`, decrypted for display.
    ///
    /// A body that cannot be decrypted is replaced by
    /// [`DECRYPTION_PLACEHOLDER`].
    pub fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        Ok(self.backend.get_note(id)?.map(|note| self.reveal(note)))
    }

    /// Returns the notes matching `filter`, pinned first then most recently
    /// updated.
    pub fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let notes = self
            .backend
            .list_notes()?
            .into_iter()
            .map(|note| self.reveal(note))
            .collect();
        Ok(query::filter_notes(notes, filter))
    }

    /// Merges the supplied fields into the note with `id`.
    ///
    /// New content for an encrypted note is sealed before it is written.
    /// Flipping `encrypted` re-encodes the stored body: turning encryption
    /// off requires a key that opens the current body.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingKey` or `StoreError::Codec` when the body
    /// cannot be sealed or opened; the note is left untouched.
    pub fn update_note(&mut self, id: NoteId, mut update: NoteUpdate) -> Result<Option<Note>> {
        let Some(stored) = self.backend.get_note(id)? else {
            return Ok(None);
        };

        let encrypt = update.encrypted.unwrap_or(stored.encrypted());
        let plaintext = match update.content.take() {
            Some(content) => Some(content),
            None if encrypt != stored.encrypted() => Some(if stored.encrypted() {
                self.open_body(&stored)?
            } else {
                stored.content().to_string()
            }),
            None => None,
        };

        if let Some(plaintext) = plaintext {
            update.content = Some(if encrypt {
                self.seal(&plaintext, Some(id))?
            } else {
                plaintext
            });
        }

        let updated = self.backend.update_note(id, update)?;
        if updated.is_some() {
            debug!("Updated note {id}");
        }
        Ok(updated.map(|note| self.reveal(note)))
    }

    /// Hard-deletes the note with `id`. Returns whether it existed.
    pub fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        let deleted = self.backend.delete_note(id)?;
        if deleted {
            debug!("Deleted note {id}");
        }
        Ok(deleted)
    }

    pub fn create_folder(&mut self, folder: NewFolder) -> Result<Folder> {
        if folder.name.trim().is_empty() {
            return Err(StoreError::Validation(
                "folder name cannot be empty".to_string(),
            ));
        }
        self.backend.create_folder(folder)
    }

    pub fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        self.backend.get_folder(id)
    }

    /// Returns every folder sorted by name.
    pub fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut folders = self.backend.list_folders()?;
        query::sort_folders(&mut folders);
        Ok(folders)
    }

    pub fn update_folder(&mut self, id: FolderId, update: FolderUpdate) -> Result<Option<Folder>> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(StoreError::Validation(
                "folder name cannot be empty".to_string(),
            ));
        }
        self.backend.update_folder(id, update)
    }

    /// Deletes a folder. Notes that referenced it stay readable.
    pub fn delete_folder(&mut self, id: FolderId) -> Result<bool> {
        self.backend.delete_folder(id)
    }

    /// Returns the derived tag index, most used first.
    pub fn tags(&self) -> Result<Vec<Tag>> {
        Ok(query::derive_tags(&self.backend.list_notes()?))
    }

    /// Stores fully populated records produced by an import converter.
    ///
    /// Each record gets a fresh id; every other field, timestamps included,
    /// is kept. A record flagged encrypted whose body is already a sealed
    /// blob is stored as is; otherwise its body is sealed with the session
    /// key. Records are written one at a time and the first failure stops
    /// the import, keeping what was already written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` for an encrypted record whose body
    /// is [`DECRYPTION_PLACEHOLDER`]: its real content is not in the record.
    pub fn import_notes(&mut self, notes: Vec<Note>) -> Result<Vec<Note>> {
        let mut imported = Vec::with_capacity(notes.len());
        for note in notes {
            let mut input = NewNote::from(note);
            if input.encrypted && input.content == DECRYPTION_PLACEHOLDER {
                return Err(StoreError::Validation(format!(
                    "encrypted note \"{}\" has no recoverable body",
                    input.title
                )));
            }
            if input.encrypted && !codec::looks_encrypted(&input.content) {
                input.content = self.seal(&input.content, None)?;
            }
            let created = self.backend.create_note(input)?;
            imported.push(self.reveal(created));
        }
        info!("Imported {} notes", imported.len());
        Ok(imported)
    }

    /// Returns every note in listing order with readable bodies.
    ///
    /// An encrypted body that cannot be opened is exported still sealed, so
    /// importing it under the right key restores the note.
    pub fn export_notes(&self) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .backend
            .list_notes()?
            .into_iter()
            .map(|mut note| {
                if note.encrypted() {
                    match self.open_body(&note) {
                        Ok(plaintext) => note.set_content(plaintext),
                        Err(e) => warn!("Exporting note {} sealed: {e}", note.id()),
                    }
                }
                note
            })
            .collect();
        query::sort_notes(&mut notes);
        Ok(notes)
    }

    fn seal(&self, plaintext: &str, id: Option<NoteId>) -> Result<String> {
        let key = self.key.as_ref().ok_or(StoreError::MissingKey { id })?;
        Ok(codec::encrypt(plaintext, key.expose())?)
    }

    fn open_body(&self, note: &Note) -> Result<String> {
        let key = self
            .key
            .as_ref()
            .ok_or(StoreError::MissingKey { id: Some(note.id()) })?;
        Ok(codec::decrypt(note.content(), key.expose())?)
    }

    /// Replaces a stored payload with what a caller may see.
    fn reveal(&self, mut note: Note) -> Note {
        if !note.encrypted() {
            return note;
        }
        let content = match self.open_body(&note) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!("Note {} cannot be decrypted: {e}", note.id());
                DECRYPTION_PLACEHOLDER.to_string()
            }
        };
        note.set_content(content);
        note
    }
}

#[cfg(test)]
#[path = "store/tests.rs"]
mod tests;
