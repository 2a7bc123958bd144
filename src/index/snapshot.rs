//! On-disk snapshot of one index generation.
//!
//! A snapshot is a single `bincode` blob holding the texts, ids, and the
//! embedding matrix. Writes go to `<path>.tmp` and are renamed into place, so
//! a reader sees either the previous snapshot or the new one, never a torn
//! write.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped whenever the layout below changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub model: String,
    pub texts: Vec<String>,
    pub ids: Vec<String>,
    /// One row per entry, `ids.len()` rows.
    pub embeddings: Array2<f32>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot could not be encoded: {0}")]
    Encode(#[source] bincode::Error),
    #[error("snapshot could not be decoded: {0}")]
    Decode(#[source] bincode::Error),
    #[error("snapshot version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("snapshot is misaligned: {texts} texts, {ids} ids, {rows} embedding rows")]
    Misaligned { texts: usize, ids: usize, rows: usize },
}

impl Snapshot {
    pub fn new(model: &str, texts: Vec<String>, ids: Vec<String>, embeddings: Array2<f32>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            model: model.to_string(),
            texts,
            ids,
            embeddings,
        }
    }

    fn validate(self) -> Result<Self, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let rows = self.embeddings.nrows();
        if self.texts.len() != self.ids.len() || self.ids.len() != rows {
            return Err(SnapshotError::Misaligned {
                texts: self.texts.len(),
                ids: self.ids.len(),
                rows,
            });
        }
        Ok(self)
    }
}

/// Atomically replace the snapshot at `path`.
pub fn write(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = bincode::serialize(snapshot).map_err(SnapshotError::Encode)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp_path = tmp_path(path);
    std::fs::write(&tmp_path, bytes).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

/// Read the snapshot at `path`. `Ok(None)` when no file exists.
pub fn read(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let snapshot: Snapshot = bincode::deserialize(&bytes).map_err(SnapshotError::Decode)?;
    snapshot.validate().map(Some)
}

/// Remove the snapshot (and any stale temp file). Missing files are fine.
pub fn remove(path: &Path) -> Result<(), SnapshotError> {
    for p in [path.to_path_buf(), tmp_path(path)] {
        match std::fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(SnapshotError::Io { path: p, source }),
        }
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
