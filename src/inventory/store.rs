//! On-disk persistence for the inventory document.
//!
//! Load, backup-rotate, and save. The save path is backup-then-overwrite:
//! the previous file is copied to a `.old` sibling, then the new document is
//! written in place. A crash between those two steps can leave the pair
//! inconsistent — a known, documented property of the format, not something
//! this module papers over.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::InventoryDocument;

/// Errors from inventory file I/O. All of them are fatal to the run — a
/// document that cannot be loaded or written leaves nothing sensible to
/// reconcile.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The inventory file could not be read.
    #[error("cannot read inventory '{}': {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The inventory file is not valid inventory JSON.
    #[error("invalid inventory JSON in '{}': {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The pre-run backup copy failed.
    #[error("cannot back up inventory to '{}': {source}", path.display())]
    Rotate {
        /// Backup destination.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The enriched document could not be written back.
    #[error("cannot write inventory '{}': {source}", path.display())]
    Write {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The in-memory document could not be serialized. Practically
    /// unreachable for string-keyed documents; surfaced rather than
    /// panicking.
    #[error("cannot serialize inventory: {source}")]
    Serialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Handle on one inventory file.
pub struct InventoryStore {
    path: PathBuf,
}

impl InventoryStore {
    /// Create a store for the given file path. No I/O happens until
    /// [`load`](Self::load).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The inventory file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `.old` sibling the previous version is rotated to.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| "inventory".into(), ToOwned::to_owned);
        name.push(".old");
        self.path.with_file_name(name)
    }

    /// Load and parse the document.
    pub fn load(&self) -> Result<InventoryDocument, InventoryError> {
        let content = fs::read_to_string(&self.path).map_err(|source| InventoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        let doc = serde_json::from_str(&content).map_err(|source| InventoryError::Parse {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "loaded inventory");
        Ok(doc)
    }

    /// Copy the current on-disk file to its `.old` sibling, byte for byte.
    pub fn rotate(&self) -> Result<PathBuf, InventoryError> {
        let backup = self.backup_path();
        fs::copy(&self.path, &backup).map_err(|source| InventoryError::Rotate {
            path: backup.clone(),
            source,
        })?;
        debug!(backup = %backup.display(), "rotated previous inventory");
        Ok(backup)
    }

    /// Serialize with sorted keys and two-space indentation, then overwrite
    /// the inventory file. Call [`rotate`](Self::rotate) first.
    pub fn save(&self, doc: &InventoryDocument) -> Result<(), InventoryError> {
        // Going through Value sorts keys at every nesting level; the
        // document's maps are BTree-backed and Value objects follow suit.
        let value =
            serde_json::to_value(doc).map_err(|source| InventoryError::Serialize { source })?;
        let mut rendered = serde_json::to_string_pretty(&value)
            .map_err(|source| InventoryError::Serialize { source })?;
        rendered.push('\n');

        fs::write(&self.path, rendered).map_err(|source| InventoryError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "wrote enriched inventory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{"hosts": {"EU": {"host": "localhost", "user": "user"}}}"#;

    fn store_with(content: &str) -> (TempDir, InventoryStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, content).unwrap();
        (dir, InventoryStore::new(path))
    }

    #[test]
    fn load_parses_the_sample() {
        let (_dir, store) = store_with(SAMPLE);
        let doc = store.load().unwrap();
        assert_eq!(doc.units().len(), 1);
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let store = InventoryStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(InventoryError::Read { .. })));
    }

    #[test]
    fn load_bad_json_is_parse_error() {
        let (_dir, store) = store_with("{not json");
        assert!(matches!(store.load(), Err(InventoryError::Parse { .. })));
    }

    #[test]
    fn rotate_copies_bytes_exactly() {
        let odd = "{\"hosts\":{}}   \n\n";
        let (_dir, store) = store_with(odd);

        let backup = store.rotate().unwrap();
        assert_eq!(backup, store.backup_path());
        assert_eq!(fs::read_to_string(backup).unwrap(), odd);
    }

    #[test]
    fn backup_path_appends_old_to_the_full_name() {
        let store = InventoryStore::new("/data/fleet/inventory.json");
        assert_eq!(
            store.backup_path(),
            PathBuf::from("/data/fleet/inventory.json.old")
        );
    }

    #[test]
    fn save_writes_sorted_keys_with_stable_indent() {
        let (_dir, store) = store_with(r#"{"hosts": {"Z": {"host": "z", "user": "u"}, "A": {"user": "u", "host": "a", "title": "t"}}}"#);
        let doc = store.load().unwrap();
        store.save(&doc).unwrap();

        let written = fs::read_to_string(store.path()).unwrap();
        // Two-space indentation, sorted cluster names, sorted record keys,
        // trailing newline.
        assert!(written.starts_with("{\n  \"hosts\""));
        assert!(written.ends_with('\n'));
        let a = written.find("\"A\"").unwrap();
        let z = written.find("\"Z\"").unwrap();
        assert!(a < z);
        let host = written.find("\"host\": \"a\"").unwrap();
        let title = written.find("\"title\"").unwrap();
        assert!(host < title);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = store_with(SAMPLE);
        let doc = store.load().unwrap();
        store.save(&doc).unwrap();
        assert_eq!(store.load().unwrap(), doc);
    }
}
