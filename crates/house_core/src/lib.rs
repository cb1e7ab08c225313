use std::env;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

pub mod cache;
pub mod geometry;
pub mod rooms;
pub mod session;
pub mod stats;
pub mod storage;

pub use cache::LruCache;
pub use geometry::{
    scan, HeightSource, LocalPoint, ScanRequest, TerrainError, TileHeightGrid, UsableRegionMap,
    ZoneOrigin, ZoneTile,
};
pub use rooms::{
    decode, reconcile, room_event_channel, BatchReport, CachedNameLookup, HouseState, NameLookup,
    ObjectSpawn, RawRoomEvent, ReconciliationResult, RoomEventInbox, RoomEventSender, RoomMap,
    RoomRecord,
};
pub use session::{FlushReport, HouseSession, ObjectPlacement, PlacedObject, PlacementError};
pub use stats::{HouseStatsHandle, HouseStatsSnapshot};
pub use storage::{HouseStorage, LocalFileStorage, MemoryStorage, StorageError};

pub const SAVE_DIR_ENV_VAR: &str = "HOUSE_EDITOR_SAVE_DIR";
pub const USERNAME_ENV_VAR: &str = "HOUSE_EDITOR_USERNAME";
const DEFAULT_SAVE_DIR_NAME: &str = ".house-editor";

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("home directory is unavailable; set {env_var} to choose a save directory")]
    HomeDirUnavailable { env_var: &'static str },
    #[error("failed to create save directory at {path}: {source}")]
    CreateSaveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves the directory room snapshots live in and makes sure it exists.
pub fn resolve_save_dir() -> Result<PathBuf, PathsError> {
    let save_dir = save_dir_from(env::var(SAVE_DIR_ENV_VAR), dirs::home_dir())?;
    fs::create_dir_all(&save_dir).map_err(|source| PathsError::CreateSaveDir {
        path: save_dir.clone(),
        source,
    })?;
    Ok(save_dir)
}

/// Username from the environment, if one is set and non-blank.
pub fn username_from_env() -> Result<Option<String>, PathsError> {
    match env::var(USERNAME_ENV_VAR) {
        Ok(value) => {
            let trimmed = value.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(PathsError::EnvVar {
            var: USERNAME_ENV_VAR,
            source,
        }),
    }
}

fn save_dir_from(
    env_value: Result<String, env::VarError>,
    home: Option<PathBuf>,
) -> Result<PathBuf, PathsError> {
    match env_value {
        Ok(value) if !value.trim().is_empty() => Ok(PathBuf::from(value.trim())),
        Ok(_) | Err(env::VarError::NotPresent) => home
            .map(|home| home.join(DEFAULT_SAVE_DIR_NAME))
            .ok_or(PathsError::HomeDirUnavailable {
                env_var: SAVE_DIR_ENV_VAR,
            }),
        Err(source) => Err(PathsError::EnvVar {
            var: SAVE_DIR_ENV_VAR,
            source,
        }),
    }
}
