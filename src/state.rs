//! The persisted sync position and the lock that keeps runs from overlapping.
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::PostId;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("state file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("state file {} has version {found}, newest supported is {}", path.display(), STATE_VERSION)]
    UnsupportedVersion { path: PathBuf, found: u32 },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StateError + '_ {
    move |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Source post and the destination post it became.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredPair {
    pub source_id: PostId,
    pub destination_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub version: u32,
    /// Newest source post known to be mirrored (or deliberately skipped on a
    /// cold start). Never moves backwards.
    pub last_synced_id: Option<PostId>,
    #[serde(default)]
    pub source_account_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Newest first, capped by the caller.
    #[serde(default)]
    pub mirrored: Vec<MirroredPair>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_synced_id: None,
            source_account_id: None,
            updated_at: None,
            mirrored: Vec::new(),
        }
    }
}

impl SyncState {
    pub fn is_cold_start(&self) -> bool {
        self.last_synced_id.is_none()
    }

    /// Move the position forward to `id`. Returns false (and changes nothing)
    /// when `id` is not newer than the current position.
    pub fn advance_to(&mut self, id: &PostId) -> bool {
        if self.last_synced_id.as_ref().is_some_and(|cur| id <= cur) {
            return false;
        }
        self.last_synced_id = Some(id.clone());
        self.updated_at = Some(Utc::now());
        true
    }

    /// Advance past a mirrored post and remember its destination id.
    pub fn record_mirrored(&mut self, source_id: &PostId, destination_id: &str, cap: usize) {
        if !self.advance_to(source_id) {
            return;
        }
        self.mirrored.insert(
            0,
            MirroredPair {
                source_id: source_id.clone(),
                destination_id: destination_id.to_string(),
            },
        );
        self.mirrored.truncate(cap);
    }

    pub fn destination_for(&self, source_id: &PostId) -> Option<&str> {
        self.mirrored
            .iter()
            .find(|p| &p.source_id == source_id)
            .map(|p| p.destination_id.as_str())
    }
}

/// Where the publisher persists progress after every confirmed post.
pub trait Checkpoint {
    fn commit(&mut self, state: &SyncState) -> Result<(), StateError>;
}

/// JSON state file, replaced atomically on every commit.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state, or a fresh one when no file exists yet.
    pub fn load(&self) -> Result<SyncState, StateError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file; cold start");
                return Ok(SyncState::default());
            }
            Err(err) => return Err(io_err(&self.path)(err)),
        };
        let state: SyncState =
            serde_json::from_slice(&raw).map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        if state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                path: self.path.clone(),
                found: state.version,
            });
        }
        Ok(state)
    }

    /// Write to a temp file next to the target, fsync, then rename over it.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&self, state: &SyncState) -> Result<(), StateError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
        serde_json::to_writer_pretty(&mut tmp, state).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        tmp.write_all(b"\n").map_err(io_err(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_err(&self.path))?;
        tmp.persist(&self.path)
            .map_err(|e| io_err(&self.path)(e.error))?;
        debug!(last_synced_id = ?state.last_synced_id, "state committed");
        Ok(())
    }
}

impl Checkpoint for StateStore {
    fn commit(&mut self, state: &SyncState) -> Result<(), StateError> {
        self.save(state)
    }
}

/// Exclusive advisory lock held for the whole invocation.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// `Ok(None)` when another process already holds the lock.
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Option<Self>, StateError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(io_err(&path))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Ok(None)
            }
            Err(err) => Err(io_err(&path)(err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
