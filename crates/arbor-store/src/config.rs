use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a filesystem-backed store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root; objects live under `<root>/objects`.
    pub root: PathBuf,
    /// Refuse all writes.
    pub read_only: bool,
    /// `fsync` each object file before it is renamed into place.
    pub fsync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".arbor"),
            read_only: false,
            fsync: false,
        }
    }
}

impl StoreConfig {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }
}
