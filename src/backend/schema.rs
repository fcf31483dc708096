/// Relational schema for the note store.
///
/// Uses CREATE TABLE/INDEX IF NOT EXISTS for idempotent execution.
/// Timestamps are unix nanoseconds. Tags live on the note row as a JSON
/// array; the `tags` table exists for layout compatibility and is never
/// written, since tags are derived from notes.
pub const INITIAL_SCHEMA: &str = r#"
-- Folders table: named groupings, names not unique
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    color TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Notes table: tags denormalized as JSON, folder reference nulled on folder delete
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    pinned INTEGER NOT NULL DEFAULT 0,
    encrypted INTEGER NOT NULL DEFAULT 0,
    folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Tags table: reserved, unlinked
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE
);

CREATE INDEX IF NOT EXISTS idx_notes_updated ON notes(updated_at);
CREATE INDEX IF NOT EXISTS idx_notes_folder ON notes(folder_id);
"#;
