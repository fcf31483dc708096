//! File-tree backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! notes/{id}.txt      note body (ciphertext for encrypted notes)
//! notes/{id}.json     metadata sidecar
//! folders/{id}.json   folder record
//! sequence.json       next ids
//! ```
//!
//! Files are replaced atomically through a temporary file in the same
//! directory. A sidecar that cannot be decoded, or whose body file is
//! missing or not UTF-8, hides that note only.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use walkdir::WalkDir;

use super::{Sequence, StorageBackend};
use crate::error::{Result, StoreError};
use crate::models::{
    Folder, FolderId, FolderUpdate, NewFolder, NewNote, Note, NoteBuilder, NoteId, NoteUpdate,
};

const NOTES_DIR: &str = "notes";
const FOLDERS_DIR: &str = "folders";
const SEQUENCE_FILE: &str = "sequence.json";

/// Everything about a note except its body.
#[derive(Debug, Serialize, Deserialize)]
struct NoteSidecar {
    id: NoteId,
    title: String,
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

impl NoteSidecar {
    fn from_note(note: &Note) -> Self {
        Self {
            id: note.id(),
            title: note.title().to_string(),
            tags: note.tags().to_vec(),
            pinned: note.pinned(),
            folder_id: note.folder_id(),
            encrypted: note.encrypted(),
            created_at: note.created_at(),
            updated_at: note.updated_at(),
        }
    }

    fn into_note(self, content: String) -> Note {
        NoteBuilder::new()
            .id(self.id)
            .title(self.title)
            .content(content)
            .tags(self.tags)
            .pinned(self.pinned)
            .folder_id(self.folder_id)
            .encrypted(self.encrypted)
            .created_at(self.created_at)
            .updated_at(self.updated_at)
            .build()
    }
}

/// Note backend storing one file per record under a root directory.
#[derive(Debug)]
pub struct FileTreeBackend {
    root: PathBuf,
}

impl FileTreeBackend {
    /// Opens (and if needed creates) a tree rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(NOTES_DIR))?;
        fs::create_dir_all(root.join(FOLDERS_DIR))?;
        info!("Opened file tree at {}", root.display());
        Ok(Self { root })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sidecar_path(&self, id: NoteId) -> PathBuf {
        self.root.join(NOTES_DIR).join(format!("{id}.json"))
    }

    fn body_path(&self, id: NoteId) -> PathBuf {
        self.root.join(NOTES_DIR).join(format!("{id}.txt"))
    }

    fn folder_path(&self, id: FolderId) -> PathBuf {
        self.root.join(FOLDERS_DIR).join(format!("{id}.json"))
    }

    /// Lists `*.json` files directly inside `dir`.
    fn json_files(&self, dir: &str) -> Vec<PathBuf> {
        WalkDir::new(self.root.join(dir))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    fn max_id_in(&self, dir: &str) -> Option<i64> {
        self.json_files(dir)
            .iter()
            .filter_map(|path| path.file_stem()?.to_str()?.parse::<i64>().ok())
            .max()
    }

    fn load_sequence(&self) -> Result<Sequence> {
        let path = self.root.join(SEQUENCE_FILE);
        let mut sequence = match read_json::<Sequence>(&path) {
            Ok(Some(sequence)) => sequence,
            Ok(None) => Sequence::default(),
            Err(e) => {
                warn!("Ignoring corrupt id sequence {}: {}", path.display(), e);
                Sequence::default()
            }
        };
        if let Some(max) = self.max_id_in(NOTES_DIR) {
            sequence.next_note = sequence.next_note.max(max + 1);
        }
        if let Some(max) = self.max_id_in(FOLDERS_DIR) {
            sequence.next_folder = sequence.next_folder.max(max + 1);
        }
        Ok(sequence)
    }

    fn save_sequence(&self, sequence: &Sequence) -> Result<()> {
        write_atomic(&self.root.join(SEQUENCE_FILE), &serde_json::to_vec_pretty(sequence)?)
    }

    fn write_note(&self, note: &Note) -> Result<()> {
        // Body first: a sidecar never points at a missing body.
        write_atomic(&self.body_path(note.id()), note.content().as_bytes())?;
        let sidecar = serde_json::to_vec_pretty(&NoteSidecar::from_note(note))?;
        write_atomic(&self.sidecar_path(note.id()), &sidecar)
    }

    fn read_note_at(&self, sidecar_path: &Path) -> Result<Option<Note>> {
        let Some(sidecar) = read_json::<NoteSidecar>(sidecar_path)? else {
            return Ok(None);
        };
        let body_path = self.body_path(sidecar.id);
        match read_text(&body_path)? {
            Some(content) => Ok(Some(sidecar.into_note(content))),
            None => {
                warn!(
                    "Note {} has a sidecar but no body at {}",
                    sidecar.id,
                    body_path.display()
                );
                Ok(None)
            }
        }
    }

    fn read_folder_at(&self, path: &Path) -> Result<Option<Folder>> {
        read_json(path)
    }
}

/// Reads a record file as text. A missing file is `Ok(None)`; bytes that
/// are not UTF-8 make the record corrupt.
fn read_text(path: &Path) -> Result<Option<String>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| StoreError::Serialization {
            record: path.display().to_string(),
            source: serde::de::Error::custom(e),
        })
}

/// Reads and decodes a JSON file. A missing file is `Ok(None)`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let Some(text) = read_text(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            record: path.display().to_string(),
            source,
        })
}

/// Writes `bytes` to `path` through a temporary file and an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    trace!("Wrote {}", path.display());
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Downgrades a per-record decode failure to a skipped record.
fn skip_corrupt<T>(result: Result<Option<T>>) -> Result<Option<T>> {
    match result {
        Err(StoreError::Serialization { record, source }) => {
            warn!("Skipping corrupt record {record}: {source}");
            Ok(None)
        }
        other => other,
    }
}

impl StorageBackend for FileTreeBackend {
    fn name(&self) -> &'static str {
        "file-tree"
    }

    fn create_note(&mut self, note: NewNote) -> Result<Note> {
        let mut sequence = self.load_sequence()?;
        let note = note.into_note(sequence.take_note_id())?;
        self.save_sequence(&sequence)?;
        self.write_note(&note)?;
        debug!("Created note {} under {}", note.id(), self.root.display());
        Ok(note)
    }

    fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        skip_corrupt(self.read_note_at(&self.sidecar_path(id)))
    }

    fn list_notes(&self) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        for path in self.json_files(NOTES_DIR) {
            if let Some(note) = skip_corrupt(self.read_note_at(&path))? {
                notes.push(note);
            }
        }
        Ok(notes)
    }

    fn update_note(&mut self, id: NoteId, update: NoteUpdate) -> Result<Option<Note>> {
        let Some(mut note) = self.get_note(id)? else {
            return Ok(None);
        };
        note.apply(update)?;
        self.write_note(&note)?;
        Ok(Some(note))
    }

    fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        let existed = remove_if_exists(&self.sidecar_path(id))?;
        remove_if_exists(&self.body_path(id))?;
        Ok(existed)
    }

    fn create_folder(&mut self, folder: NewFolder) -> Result<Folder> {
        let mut sequence = self.load_sequence()?;
        let folder = folder.into_folder(sequence.take_folder_id());
        self.save_sequence(&sequence)?;
        write_atomic(&self.folder_path(folder.id()), &serde_json::to_vec_pretty(&folder)?)?;
        Ok(folder)
    }

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        skip_corrupt(self.read_folder_at(&self.folder_path(id)))
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut folders = Vec::new();
        for path in self.json_files(FOLDERS_DIR) {
            if let Some(folder) = skip_corrupt(self.read_folder_at(&path))? {
                folders.push(folder);
            }
        }
        Ok(folders)
    }

    fn update_folder(&mut self, id: FolderId, update: FolderUpdate) -> Result<Option<Folder>> {
        let Some(mut folder) = self.get_folder(id)? else {
            return Ok(None);
        };
        folder.apply(update);
        write_atomic(&self.folder_path(id), &serde_json::to_vec_pretty(&folder)?)?;
        Ok(Some(folder))
    }

    fn delete_folder(&mut self, id: FolderId) -> Result<bool> {
        // Referencing notes keep the dangling id.
        remove_if_exists(&self.folder_path(id))
    }
}
