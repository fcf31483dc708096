//! Store configuration.
//!
//! A [`StoreConfig`] names the backend and the directory its files live in.
//! The session key is deliberately absent: it is supplied per process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Environment variable selecting the backend.
pub const BACKEND_ENV: &str = "NOTEKEEP_BACKEND";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "NOTEKEEP_DATA_DIR";

/// Which storage medium a store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// One JSON document holding every collection under namespaced keys.
    KeyValue,
    /// One file per note plus a metadata sidecar, one file per folder.
    FileTree,
    /// SQLite tables.
    #[default]
    Relational,
}

impl BackendKind {
    /// Returns the canonical name used on the command line and in the environment.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyValue => "key-value",
            Self::FileTree => "file-tree",
            Self::Relational => "relational",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key-value" | "kv" => Ok(Self::KeyValue),
            "file-tree" | "files" => Ok(Self::FileTree),
            "relational" | "sqlite" => Ok(Self::Relational),
            other => Err(StoreError::Validation(format!(
                "unknown backend '{other}' (expected key-value, file-tree or relational)"
            ))),
        }
    }
}

/// Where and how a [`crate::NoteStore`] persists its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(backend: BackendKind, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            data_dir: data_dir.into(),
        }
    }

    /// Builds a configuration from the process environment.
    ///
    /// Loads a `.env` file if one exists, then reads `NOTEKEEP_BACKEND`
    /// (default `relational`) and `NOTEKEEP_DATA_DIR` (default
    /// `{data_dir}/notekeep`, where `data_dir` is the platform data directory).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the backend name is unknown or no
    /// data directory can be determined.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let backend = match std::env::var(BACKEND_ENV) {
            Ok(name) if !name.trim().is_empty() => name.parse()?,
            _ => BackendKind::default(),
        };

        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };

        Ok(Self::new(backend, data_dir))
    }

    /// Path of the JSON document used by the key-value backend.
    pub fn key_value_path(&self) -> PathBuf {
        self.data_dir.join("notekeep-kv.json")
    }

    /// Root directory of the file-tree backend.
    pub fn tree_root(&self) -> PathBuf {
        self.data_dir.join("tree")
    }

    /// SQLite database file of the relational backend.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("notes.db")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Returns `{platform data dir}/notekeep`.
///
/// - Linux: `~/.local/share/notekeep`
/// - macOS: `~/Library/Application Support/notekeep`
/// - Windows: `C:\Users\<user>\AppData\Roaming\notekeep`
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| {
        StoreError::Validation(format!(
            "failed to determine data directory; set {DATA_DIR_ENV}"
        ))
    })?;
    Ok(base.join("notekeep"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        unsafe {
            std::env::remove_var(BACKEND_ENV);
            std::env::remove_var(DATA_DIR_ENV);
        }
    }

    #[test]
    fn backend_kind_parses_canonical_names_and_aliases() {
        assert_eq!("key-value".parse::<BackendKind>().unwrap(), BackendKind::KeyValue);
        assert_eq!("FILE-TREE".parse::<BackendKind>().unwrap(), BackendKind::FileTree);
        assert_eq!(" sqlite ".parse::<BackendKind>().unwrap(), BackendKind::Relational);
    }

    #[test]
    fn backend_kind_rejects_unknown_names() {
        let err = "mongo".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(err.to_string().contains("mongo"));
    }

    #[test]
    fn backend_kind_display_matches_serde() {
        for kind in [BackendKind::KeyValue, BackendKind::FileTree, BackendKind::Relational] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let config = StoreConfig::new(BackendKind::KeyValue, "/tmp/nk");
        assert_eq!(config.key_value_path(), PathBuf::from("/tmp/nk/notekeep-kv.json"));
        assert_eq!(config.tree_root(), PathBuf::from("/tmp/nk/tree"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/nk/notes.db"));
    }

    #[test]
    #[serial]
    fn from_env_reads_backend_and_data_dir() {
        unsafe {
            std::env::set_var(BACKEND_ENV, "file-tree");
            std::env::set_var(DATA_DIR_ENV, "/tmp/notekeep-env-test");
        }

        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.backend, BackendKind::FileTree);
        assert_eq!(config.data_dir(), Path::new("/tmp/notekeep-env-test"));

        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_defaults_to_relational() {
        clear_env();
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/notekeep-env-test");
        }

        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.backend, BackendKind::Relational);

        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_rejects_unknown_backend() {
        unsafe {
            std::env::set_var(BACKEND_ENV, "cloud");
        }

        assert!(StoreConfig::from_env().is_err());

        clear_env();
    }
}
