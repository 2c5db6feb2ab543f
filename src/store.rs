//! JSON file persistence shared by the history log and the profile store.
//!
//! Reads distinguish a file that does not exist yet (`Ok(None)`) from a file
//! that exists but cannot be parsed ([`StoreError::StoreCorrupt`]). Writes go
//! to a temporary file in the target directory which is then renamed over the
//! target, so a crash mid-write never leaves a half-written file behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The file exists but its content is not what we expect.
    #[error("{} is corrupt: {source}", path.display())]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for [`StoreError::StoreCorrupt`].
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::StoreCorrupt { .. })
    }
}

/// Reads and parses `path`. Only a missing file yields `Ok(None)`; an empty
/// file is what an interrupted in-place write leaves, so it is corrupt.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::StoreCorrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value).map_err(StoreError::Serialize)?;
    tmp.write_all(b"\n").map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;

    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}
