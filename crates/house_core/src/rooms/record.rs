use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Engine angle units in a full turn.
pub const ORIENTATION_FULL_TURN: i32 = 2048;
/// One of eight facings.
pub const ORIENTATION_STEP: i32 = 256;

/// Rooms keyed by engine slot index. Ordered so every pass over it is
/// deterministic.
pub type RoomMap = BTreeMap<i32, RoomRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpawn {
    pub gameval: String,
    pub tile_x: i32,
    pub tile_y: i32,
    pub orientation: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub index: i32,
    pub db_row_id: i32,
    pub x: i32,
    pub y: i32,
    pub level: i32,
    pub rotation: i32,
    pub room_id: i32,
    pub bitpacked: i32,
    pub flag1: i32,
    pub flag2: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<ObjectSpawn>,
}

impl RoomRecord {
    /// Whether `other` is the same physical room, possibly relocated or
    /// reindexed. Position, level and index are deliberately ignored.
    pub fn matches_for_remapping(&self, other: &RoomRecord) -> bool {
        self.rotation == other.rotation
            && self.db_row_id == other.db_row_id
            && self.bitpacked == other.bitpacked
            && self.flag2 == other.flag2
            && self.name == other.name
    }

    pub fn same_position(&self, other: &RoomRecord) -> bool {
        self.x == other.x && self.y == other.y && self.level == other.level
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl fmt::Display for RoomRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Room[index={}, id={}, x={}, y={}, level={}, rotation={}, dbRowId={}, name={}]",
            self.index,
            self.room_id,
            self.x,
            self.y,
            self.level,
            self.rotation,
            self.db_row_id,
            self.display_name()
        )
    }
}

pub fn orientation_in_range(orientation: i32) -> bool {
    (0..ORIENTATION_FULL_TURN).contains(&orientation)
}

/// Next facing clockwise.
pub fn rotate_orientation(orientation: i32) -> i32 {
    (orientation + ORIENTATION_STEP).rem_euclid(ORIENTATION_FULL_TURN)
}

/// Nearest of the eight facings, ties rounding up.
pub fn snap_orientation(orientation: i32) -> i32 {
    let half_step = ORIENTATION_STEP / 2;
    let steps = (orientation + half_step).div_euclid(ORIENTATION_STEP);
    (steps * ORIENTATION_STEP).rem_euclid(ORIENTATION_FULL_TURN)
}

#[cfg(test)]
pub(crate) fn test_room(index: i32, db_row_id: i32, x: i32, y: i32) -> RoomRecord {
    RoomRecord {
        index,
        db_row_id,
        x,
        y,
        level: 0,
        rotation: 0,
        room_id: 1,
        bitpacked: 0x1234,
        flag1: (x - 1) | ((y - 1) << 3),
        flag2: 0,
        name: Some(format!("ROOM {db_row_id}")),
        objects: Vec::new(),
    }
}

#[cfg(test)]
pub(crate) fn test_object(gameval: &str, tile_x: i32, tile_y: i32) -> ObjectSpawn {
    ObjectSpawn {
        gameval: gameval.to_string(),
        tile_x,
        tile_y,
        orientation: 0,
    }
}
