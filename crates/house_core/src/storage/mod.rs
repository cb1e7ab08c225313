use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::rooms::RoomMap;

mod atomic_io;
mod local_file;

pub use local_file::LocalFileStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid username {username:?}: must be non-empty and free of path separators")]
    InvalidUsername { username: String },
    #[error("failed to read room snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write room snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse room snapshot {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode room snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Per-user persistence of the room snapshot.
pub trait HouseStorage {
    fn exists(&self, username: &str) -> bool;
    fn load(&self, username: &str) -> Result<RoomMap, StorageError>;
    fn save(&mut self, username: &str, rooms: &RoomMap) -> Result<(), StorageError>;
}

impl<S: HouseStorage + ?Sized> HouseStorage for Box<S> {
    fn exists(&self, username: &str) -> bool {
        (**self).exists(username)
    }

    fn load(&self, username: &str) -> Result<RoomMap, StorageError> {
        (**self).load(username)
    }

    fn save(&mut self, username: &str, rooms: &RoomMap) -> Result<(), StorageError> {
        (**self).save(username, rooms)
    }
}

/// Keeps snapshots in process memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    snapshots: HashMap<String, RoomMap>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HouseStorage for MemoryStorage {
    fn exists(&self, username: &str) -> bool {
        validate_username(username)
            .map(|key| self.snapshots.contains_key(key))
            .unwrap_or(false)
    }

    fn load(&self, username: &str) -> Result<RoomMap, StorageError> {
        let key = validate_username(username)?;
        Ok(self.snapshots.get(key).cloned().unwrap_or_default())
    }

    fn save(&mut self, username: &str, rooms: &RoomMap) -> Result<(), StorageError> {
        let key = validate_username(username)?;
        self.snapshots.insert(key.to_string(), rooms.clone());
        Ok(())
    }
}

/// Returns the trimmed name every storage keys on.
pub(crate) fn validate_username(username: &str) -> Result<&str, StorageError> {
    let trimmed = username.trim();
    let has_separator = trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == "..";
    if trimmed.is_empty() || has_separator {
        return Err(StorageError::InvalidUsername {
            username: username.to_string(),
        });
    }
    Ok(trimmed)
}
