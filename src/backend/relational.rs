//! SQLite backend.
//!
//! Notes and folders are rows; a note's tags are a JSON array column.
//! `notes.folder_id` is a foreign key with `ON DELETE SET NULL`, so deleting
//! a folder detaches its notes instead of removing them. Constraint failures
//! fail the single operation and name the offending column.

use std::path::Path;

use log::{debug, info, warn};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ffi};
use time::OffsetDateTime;

use super::StorageBackend;
use super::schema::INITIAL_SCHEMA;
use crate::error::{Result, StoreError};
use crate::models::{
    Folder, FolderId, FolderUpdate, NewFolder, NewNote, Note, NoteBuilder, NoteId, NoteUpdate,
};

const NOTE_COLUMNS: &str =
    "id, title, content, tags, pinned, encrypted, folder_id, created_at, updated_at";
const FOLDER_COLUMNS: &str = "id, name, color, created_at, updated_at";

/// A note row before its JSON and timestamp columns are decoded.
struct NoteRow {
    id: i64,
    title: String,
    content: String,
    tags: String,
    pinned: bool,
    encrypted: bool,
    folder_id: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl NoteRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            tags: row.get(3)?,
            pinned: row.get(4)?,
            encrypted: row.get(5)?,
            folder_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<Note> {
        let tags: Vec<String> =
            serde_json::from_str(&self.tags).map_err(|source| StoreError::Serialization {
                record: format!("notes#{}", self.id),
                source,
            })?;

        Ok(NoteBuilder::new()
            .id(NoteId::new(self.id))
            .title(self.title)
            .content(self.content)
            .tags(tags)
            .pinned(self.pinned)
            .encrypted(self.encrypted)
            .folder_id(self.folder_id.map(FolderId::new))
            .created_at(from_nanos(self.created_at)?)
            .updated_at(from_nanos(self.updated_at)?)
            .build())
    }
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, Option<String>, i64, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_folder(raw: (i64, String, Option<String>, i64, i64)) -> Result<Folder> {
    let (id, name, color, created_at, updated_at) = raw;
    Ok(Folder::new(
        FolderId::new(id),
        name,
        color,
        from_nanos(created_at)?,
        from_nanos(updated_at)?,
    ))
}

/// Separates per-row column failures, which make only that record corrupt,
/// from failures of the query itself.
fn isolate_row<T>(read: rusqlite::Result<T>) -> rusqlite::Result<Result<T>> {
    match read {
        Ok(value) => Ok(Ok(value)),
        Err(
            e @ (rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)),
        ) => Ok(Err(StoreError::Sqlite(e))),
        Err(e) => Err(e),
    }
}

fn to_nanos(timestamp: OffsetDateTime) -> Result<i64> {
    i64::try_from(timestamp.unix_timestamp_nanos())
        .map_err(|_| StoreError::Validation(format!("timestamp {timestamp} is out of range")))
}

fn from_nanos(nanos: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|e| StoreError::Validation(format!("invalid stored timestamp {nanos}: {e}")))
}

/// Maps SQLite constraint failures to [`StoreError::Constraint`].
fn map_write_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            let message = message.unwrap_or_else(|| failure.to_string());
            let field = if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                "folder_id".to_string()
            } else {
                // "NOT NULL constraint failed: notes.title"
                message
                    .rsplit(['.', ' '])
                    .next()
                    .filter(|s| !s.is_empty())
                    .unwrap_or("unknown")
                    .to_string()
            };
            StoreError::Constraint { field, message }
        }
        other => StoreError::Sqlite(other),
    }
}

/// Note backend over a SQLite connection.
#[derive(Debug)]
pub struct RelationalBackend {
    conn: Connection,
}

impl RelationalBackend {
    /// Opens an in-memory SQLite database.
    ///
    /// Automatically initializes the schema on connection open.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self { conn };
        backend.initialize_schema()?;
        Ok(backend)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let backend = Self { conn };
        backend.initialize_schema()?;
        info!("Opened database {}", path.display());
        Ok(backend)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;
        self.conn.execute_batch(INITIAL_SCHEMA)?;
        Ok(())
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn write_note_row(&self, note: &Note) -> Result<()> {
        let tags = serde_json::to_string(note.tags())?;
        self.conn
            .execute(
                "UPDATE notes
                 SET title = ?1, content = ?2, tags = ?3, pinned = ?4, encrypted = ?5,
                     folder_id = ?6, updated_at = ?7
                 WHERE id = ?8",
                rusqlite::params![
                    note.title(),
                    note.content(),
                    tags,
                    note.pinned(),
                    note.encrypted(),
                    note.folder_id().map(FolderId::get),
                    to_nanos(note.updated_at())?,
                    note.id().get(),
                ],
            )
            .map_err(map_write_error)?;
        Ok(())
    }
}

impl StorageBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        "relational"
    }

    fn create_note(&mut self, note: NewNote) -> Result<Note> {
        let note = note.into_note(NoteId::new(0))?;
        let tags = serde_json::to_string(note.tags())?;

        self.conn
            .execute(
                "INSERT INTO notes (title, content, tags, pinned, encrypted, folder_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    note.title(),
                    note.content(),
                    tags,
                    note.pinned(),
                    note.encrypted(),
                    note.folder_id().map(FolderId::get),
                    to_nanos(note.created_at())?,
                    to_nanos(note.updated_at())?,
                ],
            )
            .map_err(map_write_error)?;

        let note = note.with_id(NoteId::new(self.conn.last_insert_rowid()));
        debug!("Inserted note {}", note.id());
        Ok(note)
    }

    fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                [id.get()],
                |row| isolate_row(NoteRow::from_row(row)),
            )
            .optional()?;

        match row.map(|row| row.and_then(NoteRow::decode)) {
            None => Ok(None),
            Some(Ok(note)) => Ok(Some(note)),
            Some(Err(e)) => {
                warn!("Note {id} is unreadable: {e}");
                Ok(None)
            }
        }
    }

    fn list_notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes"))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, isolate_row(NoteRow::from_row(row))?))
        })?;

        let mut notes = Vec::new();
        for row_result in rows {
            let (id, row) = row_result?;
            match row.and_then(NoteRow::decode) {
                Ok(note) => notes.push(note),
                Err(e) => warn!("Skipping corrupt note row {id}: {e}"),
            }
        }
        Ok(notes)
    }

    fn update_note(&mut self, id: NoteId, update: NoteUpdate) -> Result<Option<Note>> {
        let Some(mut note) = self.get_note(id)? else {
            return Ok(None);
        };
        note.apply(update)?;
        self.write_note_row(&note)?;
        Ok(Some(note))
    }

    fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1", [id.get()])?;
        Ok(affected > 0)
    }

    fn create_folder(&mut self, folder: NewFolder) -> Result<Folder> {
        let folder = folder.into_folder(FolderId::new(0));
        self.conn
            .execute(
                "INSERT INTO folders (name, color, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    folder.name(),
                    folder.color(),
                    to_nanos(folder.created_at())?,
                    to_nanos(folder.updated_at())?,
                ],
            )
            .map_err(map_write_error)?;

        Ok(folder.with_id(FolderId::new(self.conn.last_insert_rowid())))
    }

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1"),
                [id.get()],
                |row| isolate_row(folder_from_row(row)),
            )
            .optional()?;

        match row.map(|raw| raw.and_then(decode_folder)) {
            None => Ok(None),
            Some(Ok(folder)) => Ok(Some(folder)),
            Some(Err(e)) => {
                warn!("Folder {id} is unreadable: {e}");
                Ok(None)
            }
        }
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FOLDER_COLUMNS} FROM folders"))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, isolate_row(folder_from_row(row))?))
        })?;

        let mut folders = Vec::new();
        for row_result in rows {
            let (id, raw) = row_result?;
            match raw.and_then(decode_folder) {
                Ok(folder) => folders.push(folder),
                Err(e) => warn!("Skipping corrupt folder row {id}: {e}"),
            }
        }
        Ok(folders)
    }

    fn update_folder(&mut self, id: FolderId, update: FolderUpdate) -> Result<Option<Folder>> {
        let Some(mut folder) = self.get_folder(id)? else {
            return Ok(None);
        };
        folder.apply(update);
        self.conn
            .execute(
                "UPDATE folders SET name = ?1, color = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![
                    folder.name(),
                    folder.color(),
                    to_nanos(folder.updated_at())?,
                    id.get(),
                ],
            )
            .map_err(map_write_error)?;
        Ok(Some(folder))
    }

    fn delete_folder(&mut self, id: FolderId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM folders WHERE id = ?1", [id.get()])
            .map_err(map_write_error)?;
        Ok(affected > 0)
    }
}
