use serde::{Deserialize, Serialize};

use super::{CHUNK_SIZE, LOCAL_COORD_BITS, TILES_PER_ZONE, ZONE_MAX, ZONE_MIN};

/// First scene tile of the interior; the outer chunk is never part of a house.
const INTERIOR_START: i32 = CHUNK_SIZE;

/// Scene position in local units (128 per tile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPoint {
    pub x: i32,
    pub y: i32,
}

/// Chunk-grid cell that zone (1, 1) maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneOrigin {
    pub chunk_x: i32,
    pub chunk_z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneTile {
    pub zone_x: i32,
    pub zone_y: i32,
    pub tile_x: i32,
    pub tile_y: i32,
}

impl ZoneTile {
    /// Row-major tile index within the zone, 0..64.
    pub fn tile_index(&self) -> i32 {
        self.tile_y * CHUNK_SIZE + self.tile_x
    }

    pub fn tile_coords(&self) -> (i32, i32) {
        (self.tile_x, self.tile_y)
    }
}

fn zone_in_range(zone: i32) -> bool {
    (ZONE_MIN..=ZONE_MAX).contains(&zone)
}

fn tile_in_range(tile: i32) -> bool {
    (0..CHUNK_SIZE).contains(&tile)
}

pub fn zone_tile_to_local(
    zone_x: i32,
    zone_y: i32,
    tile_x: i32,
    tile_y: i32,
    origin: ZoneOrigin,
) -> Option<LocalPoint> {
    if !zone_in_range(zone_x) || !zone_in_range(zone_y) {
        return None;
    }
    if !tile_in_range(tile_x) || !tile_in_range(tile_y) {
        return None;
    }

    let chunk_grid_x = origin.chunk_x + (zone_x - ZONE_MIN);
    let chunk_grid_z = origin.chunk_z + (zone_y - ZONE_MIN);
    let scene_tile_x = INTERIOR_START + chunk_grid_x * CHUNK_SIZE + tile_x;
    let scene_tile_z = INTERIOR_START + chunk_grid_z * CHUNK_SIZE + tile_y;

    Some(LocalPoint {
        x: scene_tile_x << LOCAL_COORD_BITS,
        y: scene_tile_z << LOCAL_COORD_BITS,
    })
}

pub fn zone_tile_index_to_local(
    zone_x: i32,
    zone_y: i32,
    tile_index: i32,
    origin: ZoneOrigin,
) -> Option<LocalPoint> {
    if !(0..TILES_PER_ZONE).contains(&tile_index) {
        return None;
    }
    zone_tile_to_local(
        zone_x,
        zone_y,
        tile_index % CHUNK_SIZE,
        tile_index / CHUNK_SIZE,
        origin,
    )
}

/// Local point of tile 0 of a zone.
pub fn zone_anchor(zone_x: i32, zone_y: i32, origin: ZoneOrigin) -> Option<LocalPoint> {
    zone_tile_index_to_local(zone_x, zone_y, 0, origin)
}

pub fn local_to_zone_tile(point: LocalPoint, origin: ZoneOrigin) -> Option<ZoneTile> {
    let tile_x = (point.x >> LOCAL_COORD_BITS) - INTERIOR_START;
    let tile_z = (point.y >> LOCAL_COORD_BITS) - INTERIOR_START;
    if tile_x < 0 || tile_z < 0 {
        return None;
    }

    let zone_x = tile_x / CHUNK_SIZE - origin.chunk_x + ZONE_MIN;
    let zone_y = tile_z / CHUNK_SIZE - origin.chunk_z + ZONE_MIN;
    if !zone_in_range(zone_x) || !zone_in_range(zone_y) {
        return None;
    }

    Some(ZoneTile {
        zone_x,
        zone_y,
        tile_x: tile_x % CHUNK_SIZE,
        tile_y: tile_z % CHUNK_SIZE,
    })
}
