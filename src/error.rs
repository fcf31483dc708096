//! Error types for the note store.
//!
//! Nothing here is process-fatal: every variant describes a failure of a
//! single record or a single operation. Missing records are not errors at
//! all; lookups return `Option` and deletions return `bool`.

use thiserror::Error;

use crate::NoteId;

/// Errors raised by the encryption codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The caller supplied an empty key.
    #[error("encryption key cannot be empty")]
    EmptyKey,

    /// The blob does not have the expected structure.
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    /// Authentication failed: wrong key or tampered data.
    #[error("decryption failed - wrong key or corrupted data")]
    Decryption,

    /// The cipher refused to encrypt.
    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Errors raised by storage backends and the note store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Encryption or decryption failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An encrypted note was written or rewritten without a session key.
    #[error("{} is encrypted and no key is set", describe_note(.id))]
    MissingKey { id: Option<NoteId> },

    /// A stored record could not be decoded.
    #[error("corrupt record {record}: {source}")]
    Serialization {
        record: String,
        #[source]
        source: serde_json::Error,
    },

    /// A relational write violated a constraint on `field`.
    #[error("constraint violated on {field}: {message}")]
    Constraint { field: String, message: String },

    /// Input failed validation.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors caused by caller input rather than storage.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Codec(_) | Self::MissingKey { .. } | Self::Validation(_) | Self::Constraint { .. }
        )
    }
}

fn describe_note(id: &Option<NoteId>) -> String {
    match id {
        Some(id) => format!("note {id}"),
        None => "new note".to_string(),
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
