pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod store;

pub use backend::{
    FileTreeBackend, JsonFileKeyValueStore, KeyValueBackend, KeyValueStore, MemoryKeyValueStore,
    RelationalBackend, StorageBackend,
};
pub use codec::DECRYPTION_PLACEHOLDER;
pub use config::{BackendKind, StoreConfig};
pub use error::{CodecError, Result, StoreError};
pub use models::{
    Folder, FolderId, FolderUpdate, NewFolder, NewNote, Note, NoteBuilder, NoteId, NoteUpdate,
    Tag, normalize_tags,
};
pub use query::{NoteFilter, derive_tags, filter_notes, sort_folders, sort_notes};
pub use store::NoteStore;
