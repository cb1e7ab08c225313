use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::rooms::RoomMap;

use super::atomic_io::write_text_atomic;
use super::{validate_username, HouseStorage, StorageError};

const SAVE_FILE_SUFFIX: &str = "-room-positions.json";

/// One pretty-printed JSON snapshot per user inside `save_dir`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    save_dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn save_file_path(&self, username: &str) -> Result<PathBuf, StorageError> {
        let key = validate_username(username)?;
        Ok(self.save_dir.join(format!("{key}{SAVE_FILE_SUFFIX}")))
    }
}

impl HouseStorage for LocalFileStorage {
    fn exists(&self, username: &str) -> bool {
        self.save_file_path(username)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn load(&self, username: &str) -> Result<RoomMap, StorageError> {
        let path = self.save_file_path(username)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "room_snapshot_missing");
                return Ok(RoomMap::new());
            }
            Err(source) => return Err(StorageError::Read { path, source }),
        };
        parse_rooms_json(&raw, &path)
    }

    fn save(&mut self, username: &str, rooms: &RoomMap) -> Result<(), StorageError> {
        let path = self.save_file_path(username)?;
        let json = serde_json::to_string_pretty(rooms).map_err(StorageError::Encode)?;
        write_text_atomic(&path, &json).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(rooms = rooms.len(), path = %path.display(), "room_snapshot_saved");
        Ok(())
    }
}

fn parse_rooms_json(raw: &str, path: &Path) -> Result<RoomMap, StorageError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, RoomMap>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        StorageError::Parse {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::rooms::{test_object, test_room};

    #[test]
    fn save_then_load_round_trips_rooms_and_objects() {
        let temp = TempDir::new().expect("tempdir");
        let mut storage = LocalFileStorage::new(temp.path().join("saves"));
        let mut parlour = test_room(3, 10, 2, 5);
        parlour.objects.push(test_object("chair", 1, 2));
        let rooms: RoomMap = [(3, parlour), (8, test_room(8, 11, 4, 4))]
            .into_iter()
            .collect();

        assert!(!storage.exists("alice"));
        storage.save("alice", &rooms).expect("save");
        assert!(storage.exists("alice"));
        assert_eq!(storage.load("alice").expect("load"), rooms);

        let file = storage.save_file_path("alice").expect("path");
        assert!(file.ends_with("alice-room-positions.json"));
        assert_eq!(storage.save_file_path(" alice ").expect("path"), file);
    }

    #[test]
    fn missing_file_loads_as_empty_snapshot() {
        let temp = TempDir::new().expect("tempdir");
        let storage = LocalFileStorage::new(temp.path());
        assert!(storage.load("nobody").expect("load").is_empty());
    }

    #[test]
    fn parse_errors_report_json_path() {
        let temp = TempDir::new().expect("tempdir");
        let storage = LocalFileStorage::new(temp.path());
        let path = storage.save_file_path("alice").expect("path");
        fs::write(&path, r#"{"3": {"index": 3, "db_row_id": "oops"}}"#).expect("write");

        let error = storage.load("alice").expect_err("parse error");
        match error {
            StorageError::Parse { json_path, .. } => assert_eq!(json_path, "3.db_row_id"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_username_never_touches_disk() {
        let temp = TempDir::new().expect("tempdir");
        let mut storage = LocalFileStorage::new(temp.path());
        assert!(!storage.exists("../escape"));
        assert!(matches!(
            storage.save("../escape", &RoomMap::new()),
            Err(StorageError::InvalidUsername { .. })
        ));
    }
}
