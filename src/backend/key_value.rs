//! Key-value backend.
//!
//! The whole note collection lives as one JSON array under a single
//! namespaced key, folders under another. Every write reads the full
//! collection, mutates it in memory and writes it back. Array elements are
//! decoded one by one so a corrupt element hides only itself; it is also
//! carried through rewrites untouched.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::NamedTempFile;

use super::{Sequence, StorageBackend};
use crate::error::{Result, StoreError};
use crate::models::{Folder, FolderId, FolderUpdate, NewFolder, NewNote, Note, NoteId, NoteUpdate};

pub(crate) const NOTES_KEY: &str = "notekeep:notes";
pub(crate) const FOLDERS_KEY: &str = "notekeep:folders";
pub(crate) const SEQUENCE_KEY: &str = "notekeep:sequence";

/// A string-to-string store with the shape of browser local storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: String) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Volatile store backed by a `HashMap`.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyValueStore {
    entries: HashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Durable store kept as one JSON object in a file.
///
/// The file is replaced atomically on every write.
#[derive(Debug)]
pub struct JsonFileKeyValueStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileKeyValueStore {
    /// Opens the store at `path`, creating parent directories as needed.
    ///
    /// A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text).map_err(|source| StoreError::Serialization {
                    record: path.display().to_string(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!(
            "Opened key-value file {} with {} keys",
            path.display(),
            entries.len()
        );
        Ok(Self { path, entries })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(dir)?;
        let json = serde_json::to_string_pretty(&self.entries)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(&self.path).map_err(|e| e.error)?;
        trace!("Flushed key-value file {}", self.path.display());
        Ok(())
    }
}

impl KeyValueStore for JsonFileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Note backend over any [`KeyValueStore`].
#[derive(Debug)]
pub struct KeyValueBackend<S: KeyValueStore> {
    store: S,
}

impl KeyValueBackend<MemoryKeyValueStore> {
    /// Creates a backend over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemoryKeyValueStore::new())
    }
}

impl KeyValueBackend<JsonFileKeyValueStore> {
    /// Opens a backend persisted in the JSON file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(JsonFileKeyValueStore::open(path)?))
    }
}

impl<S: KeyValueStore> KeyValueBackend<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the underlying store mutably, for fixtures and repair tools.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    fn load_raw(&self, key: &str) -> Result<Vec<Value>> {
        match self.store.get(key)? {
            None => Ok(Vec::new()),
            Some(text) => serde_json::from_str(&text).map_err(|source| StoreError::Serialization {
                record: key.to_string(),
                source,
            }),
        }
    }

    fn save_raw(&mut self, key: &str, raw: &[Value]) -> Result<()> {
        let text = serde_json::to_string(raw)?;
        self.store.set(key, text)
    }

    fn load_sequence(&self, notes: &[Note], folders: &[Folder]) -> Result<Sequence> {
        let mut sequence = match self.store.get(SEQUENCE_KEY)? {
            Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Ignoring corrupt id sequence under {SEQUENCE_KEY}: {e}");
                Sequence::default()
            }),
            None => Sequence::default(),
        };
        sequence.observe(notes, folders);
        Ok(sequence)
    }

    fn save_sequence(&mut self, sequence: &Sequence) -> Result<()> {
        let text = serde_json::to_string(sequence)?;
        self.store.set(SEQUENCE_KEY, text)
    }
}

fn record_id(value: &Value) -> Option<i64> {
    value.get("id").and_then(Value::as_i64)
}

/// Decodes every element, skipping and reporting the ones that fail.
fn decode_all<T: DeserializeOwned>(key: &str, raw: &[Value]) -> Vec<T> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping corrupt record {key}[{index}]: {e}");
                None
            }
        })
        .collect()
}

/// Finds the decodable element with `id`, returning its position.
fn find<T: DeserializeOwned>(key: &str, raw: &[Value], id: i64) -> Option<(usize, T)> {
    let index = raw.iter().position(|value| record_id(value) == Some(id))?;
    match serde_json::from_value(raw[index].clone()) {
        Ok(record) => Some((index, record)),
        Err(e) => {
            warn!("Record {key}[{index}] with id {id} is corrupt: {e}");
            None
        }
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

impl<S: KeyValueStore> StorageBackend for KeyValueBackend<S> {
    fn name(&self) -> &'static str {
        "key-value"
    }

    fn create_note(&mut self, note: NewNote) -> Result<Note> {
        let mut raw = self.load_raw(NOTES_KEY)?;
        let notes: Vec<Note> = decode_all(NOTES_KEY, &raw);
        let folders: Vec<Folder> = decode_all(FOLDERS_KEY, &self.load_raw(FOLDERS_KEY)?);
        let mut sequence = self.load_sequence(&notes, &folders)?;

        let note = note.into_note(sequence.take_note_id())?;
        raw.push(encode(&note)?);

        self.save_sequence(&sequence)?;
        self.save_raw(NOTES_KEY, &raw)?;
        debug!("Created note {} in key-value store", note.id());
        Ok(note)
    }

    fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        let raw = self.load_raw(NOTES_KEY)?;
        Ok(find(NOTES_KEY, &raw, id.get()).map(|(_, note)| note))
    }

    fn list_notes(&self) -> Result<Vec<Note>> {
        let raw = self.load_raw(NOTES_KEY)?;
        Ok(decode_all(NOTES_KEY, &raw))
    }

    fn update_note(&mut self, id: NoteId, update: NoteUpdate) -> Result<Option<Note>> {
        let mut raw = self.load_raw(NOTES_KEY)?;
        let Some((index, mut note)) = find::<Note>(NOTES_KEY, &raw, id.get()) else {
            return Ok(None);
        };

        note.apply(update)?;
        raw[index] = encode(&note)?;
        self.save_raw(NOTES_KEY, &raw)?;
        Ok(Some(note))
    }

    fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        let mut raw = self.load_raw(NOTES_KEY)?;
        let before = raw.len();
        raw.retain(|value| record_id(value) != Some(id.get()));
        if raw.len() == before {
            return Ok(false);
        }
        self.save_raw(NOTES_KEY, &raw)?;
        Ok(true)
    }

    fn create_folder(&mut self, folder: NewFolder) -> Result<Folder> {
        let mut raw = self.load_raw(FOLDERS_KEY)?;
        let folders: Vec<Folder> = decode_all(FOLDERS_KEY, &raw);
        let notes: Vec<Note> = decode_all(NOTES_KEY, &self.load_raw(NOTES_KEY)?);
        let mut sequence = self.load_sequence(&notes, &folders)?;

        let folder = folder.into_folder(sequence.take_folder_id());
        raw.push(encode(&folder)?);

        self.save_sequence(&sequence)?;
        self.save_raw(FOLDERS_KEY, &raw)?;
        Ok(folder)
    }

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        let raw = self.load_raw(FOLDERS_KEY)?;
        Ok(find(FOLDERS_KEY, &raw, id.get()).map(|(_, folder)| folder))
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let raw = self.load_raw(FOLDERS_KEY)?;
        Ok(decode_all(FOLDERS_KEY, &raw))
    }

    fn update_folder(&mut self, id: FolderId, update: FolderUpdate) -> Result<Option<Folder>> {
        let mut raw = self.load_raw(FOLDERS_KEY)?;
        let Some((index, mut folder)) = find::<Folder>(FOLDERS_KEY, &raw, id.get()) else {
            return Ok(None);
        };

        folder.apply(update);
        raw[index] = encode(&folder)?;
        self.save_raw(FOLDERS_KEY, &raw)?;
        Ok(Some(folder))
    }

    fn delete_folder(&mut self, id: FolderId) -> Result<bool> {
        let mut raw = self.load_raw(FOLDERS_KEY)?;
        let before = raw.len();
        raw.retain(|value| record_id(value) != Some(id.get()));
        if raw.len() == before {
            return Ok(false);
        }
        // Referencing notes keep the dangling id.
        self.save_raw(FOLDERS_KEY, &raw)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_memory_backend_starts_empty() {
        let backend = KeyValueBackend::in_memory();
        assert!(backend.list_notes().unwrap().is_empty());
        assert!(backend.list_folders().unwrap().is_empty());
    }

    #[test]
    fn notes_are_stored_under_a_single_key() {
        let mut backend = KeyValueBackend::in_memory();
        backend.create_note(NewNote::new("a", "1")).unwrap();
        backend.create_note(NewNote::new("b", "2")).unwrap();

        let text = backend.store().get(NOTES_KEY).unwrap().unwrap();
        let raw: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0]["title"], "a");
    }

    #[test]
    fn corrupt_element_is_skipped_and_preserved() {
        let mut backend = KeyValueBackend::in_memory();
        backend.create_note(NewNote::new("good", "x")).unwrap();

        let text = backend.store().get(NOTES_KEY).unwrap().unwrap();
        let mut raw: Vec<Value> = serde_json::from_str(&text).unwrap();
        raw.push(serde_json::json!({"id": 99, "title": 5}));
        backend
            .store_mut()
            .set(NOTES_KEY, serde_json::to_string(&raw).unwrap())
            .unwrap();

        let notes = backend.list_notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(backend.get_note(NoteId::new(99)).unwrap(), None);

        // A later write keeps the corrupt element for repair.
        backend.create_note(NewNote::new("another", "y")).unwrap();
        let text = backend.store().get(NOTES_KEY).unwrap().unwrap();
        let raw: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn new_ids_skip_past_corrupt_sequence() {
        let mut backend = KeyValueBackend::in_memory();
        let first = backend.create_note(NewNote::new("a", "")).unwrap();
        backend
            .store_mut()
            .set(SEQUENCE_KEY, "not json".to_string())
            .unwrap();

        let second = backend.create_note(NewNote::new("b", "")).unwrap();
        assert!(second.id() > first.id());
    }

    #[test]
    fn unparsable_collection_is_a_serialization_error() {
        let mut backend = KeyValueBackend::in_memory();
        backend
            .store_mut()
            .set(NOTES_KEY, "{broken".to_string())
            .unwrap();

        let err = backend.list_notes().unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[test]
    fn json_file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("kv.json");

        let id = {
            let mut backend = KeyValueBackend::open(&path).unwrap();
            backend
                .create_note(NewNote::new("persisted", "body").with_tags(["t"]))
                .unwrap()
                .id()
        };
        assert!(path.exists());

        let backend = KeyValueBackend::open(&path).unwrap();
        let note = backend.get_note(id).unwrap().expect("note should persist");
        assert_eq!(note.title(), "persisted");
        assert_eq!(note.tags(), ["t"]);
    }

    #[test]
    fn json_file_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        fs::write(&path, "[not an object").unwrap();

        let err = JsonFileKeyValueStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[test]
    fn memory_store_remove() {
        let mut store = MemoryKeyValueStore::new();
        store.set("k", "v".to_string()).unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
