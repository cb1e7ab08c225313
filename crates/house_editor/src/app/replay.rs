use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use house_core::geometry::{CHUNK_SIZE, SCENE_SIZE};
use house_core::rooms::{
    orientation_in_range, rotate_orientation, snap_orientation, ORIENTATION_FULL_TURN,
};
use house_core::{RawRoomEvent, ScanRequest, TerrainError, TileHeightGrid};
use serde::Deserialize;
use thiserror::Error;

/// Planes the engine keeps terrain for.
const TERRAIN_PLANES: i32 = 4;
/// Largest scene edge, in tiles, a replay may describe.
const MAX_SCENE_SIZE: i32 = 1024;
/// Vertex heights are bounded well inside what the engine ever reports.
const MAX_TERRAIN_HEIGHT: i32 = 1 << 20;
const FACINGS: u32 = 8;

#[derive(Debug, Error)]
pub(crate) enum ReplayError {
    #[error("failed to read replay file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse replay file {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid replay file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// A recorded house session: the terrain the player stood on and the room
/// events the host delivered, grouped by frame.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Replay {
    #[serde(default)]
    pub(crate) scene: SceneConfig,
    #[serde(default)]
    pub(crate) terrain: TerrainConfig,
    #[serde(default)]
    pub(crate) room_names: BTreeMap<i32, String>,
    #[serde(default)]
    pub(crate) frames: Vec<ReplayFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SceneConfig {
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) chunk_size: i32,
    pub(crate) plane: i32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: SCENE_SIZE,
            height: SCENE_SIZE,
            chunk_size: CHUNK_SIZE,
            plane: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct TerrainConfig {
    pub(crate) base_height: i32,
    pub(crate) raised: Vec<RaisedArea>,
}

/// Inclusive rectangle of scene tiles lifted to `height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RaisedArea {
    pub(crate) min_x: i32,
    pub(crate) min_y: i32,
    pub(crate) max_x: i32,
    pub(crate) max_y: i32,
    pub(crate) height: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ReplayFrame {
    pub(crate) events: Vec<EventRow>,
    pub(crate) placements: Vec<PlacementRow>,
    pub(crate) leave_house: bool,
}

/// `[index, dbRowId, bitpacked, flag1, flag2]` as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) struct EventRow(
    pub(crate) i32,
    pub(crate) i32,
    pub(crate) i32,
    pub(crate) i32,
    pub(crate) i32,
);

impl From<EventRow> for RawRoomEvent {
    fn from(row: EventRow) -> Self {
        let EventRow(index, db_row_id, bitpacked, flag1, flag2) = row;
        RawRoomEvent {
            index,
            db_row_id,
            bitpacked,
            flag1,
            flag2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlacementRow {
    pub(crate) zone_x: i32,
    pub(crate) zone_y: i32,
    pub(crate) tile_x: i32,
    pub(crate) tile_y: i32,
    pub(crate) gameval: String,
    #[serde(default)]
    pub(crate) orientation: i32,
    /// Quarter-facing clicks applied after snapping, like pressing rotate.
    #[serde(default)]
    pub(crate) rotations: u32,
}

impl PlacementRow {
    /// Orientation snapped to the nearest facing, then turned `rotations`
    /// steps.
    pub(crate) fn facing(&self) -> i32 {
        (0..self.rotations % FACINGS).fold(snap_orientation(self.orientation), |facing, _| {
            rotate_orientation(facing)
        })
    }
}

impl Replay {
    pub(crate) fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            scene_width: self.scene.width,
            scene_height: self.scene.height,
            chunk_size: self.scene.chunk_size,
            plane: self.scene.plane,
        }
    }

    pub(crate) fn build_terrain(&self) -> Result<TileHeightGrid, TerrainError> {
        let mut grid = TileHeightGrid::flat(
            self.scene.width,
            self.scene.height,
            TERRAIN_PLANES,
            self.terrain.base_height,
        );
        for area in &self.terrain.raised {
            grid.raise_tiles(
                self.scene.plane,
                (area.min_x, area.min_y),
                (area.max_x, area.max_y),
                area.height,
            )?;
        }
        Ok(grid)
    }

    fn validate(&self) -> Result<(), String> {
        let scene = &self.scene;
        let size_range = 1..=MAX_SCENE_SIZE;
        if !size_range.contains(&scene.width) || !size_range.contains(&scene.height) {
            return Err(format!(
                "scene size must be within 1..={MAX_SCENE_SIZE}, got {}x{}",
                scene.width, scene.height
            ));
        }
        if !size_range.contains(&scene.chunk_size) {
            return Err(format!(
                "scene.chunk_size must be within 1..={MAX_SCENE_SIZE}, got {}",
                scene.chunk_size
            ));
        }
        if !(0..TERRAIN_PLANES).contains(&scene.plane) {
            return Err(format!(
                "scene.plane must be in 0..{TERRAIN_PLANES}, got {}",
                scene.plane
            ));
        }
        let height_range = -MAX_TERRAIN_HEIGHT..=MAX_TERRAIN_HEIGHT;
        if !height_range.contains(&self.terrain.base_height) {
            return Err(format!(
                "terrain.base_height must be within ±{MAX_TERRAIN_HEIGHT}, got {}",
                self.terrain.base_height
            ));
        }
        for (index, area) in self.terrain.raised.iter().enumerate() {
            if area.min_x > area.max_x || area.min_y > area.max_y {
                return Err(format!("terrain.raised[{index}] has min greater than max"));
            }
            if !height_range.contains(&area.height) {
                return Err(format!(
                    "terrain.raised[{index}].height must be within ±{MAX_TERRAIN_HEIGHT}, got {}",
                    area.height
                ));
            }
        }
        for (frame_index, frame) in self.frames.iter().enumerate() {
            for (index, placement) in frame.placements.iter().enumerate() {
                if !orientation_in_range(placement.orientation) {
                    return Err(format!(
                        "frames[{frame_index}].placements[{index}].orientation must be in 0..{ORIENTATION_FULL_TURN}, got {}",
                        placement.orientation
                    ));
                }
                if placement.gameval.trim().is_empty() {
                    return Err(format!(
                        "frames[{frame_index}].placements[{index}].gameval must not be empty"
                    ));
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn load_replay(path: &Path) -> Result<Replay, ReplayError> {
    let raw = fs::read_to_string(path).map_err(|source| ReplayError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_replay(&raw, path)
}

pub(crate) fn parse_replay(raw: &str, path: &Path) -> Result<Replay, ReplayError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let replay = serde_path_to_error::deserialize::<_, Replay>(&mut deserializer).map_err(
        |error| {
            let json_path = error.path().to_string();
            ReplayError::Parse {
                path: path.to_path_buf(),
                json_path,
                source: error.into_inner(),
            }
        },
    )?;
    replay.validate().map_err(|message| ReplayError::Invalid {
        path: path.to_path_buf(),
        message,
    })?;
    Ok(replay)
}
