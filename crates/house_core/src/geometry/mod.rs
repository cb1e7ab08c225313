mod coords;
mod terrain;
mod usable;

pub use coords::{
    local_to_zone_tile, zone_anchor, zone_tile_index_to_local, zone_tile_to_local, LocalPoint,
    ZoneOrigin, ZoneTile,
};
pub use terrain::{TerrainError, TileHeightGrid};
pub use usable::{scan, ChunkBounds, HeightSource, ScanRequest, UsableRegionMap};

/// Tiles along one edge of a chunk (and of a zone).
pub const CHUNK_SIZE: i32 = 8;
/// Tiles along one edge of a loaded scene.
pub const SCENE_SIZE: i32 = 104;
/// Local units per tile are `1 << LOCAL_COORD_BITS`.
pub const LOCAL_COORD_BITS: u32 = 7;
pub const LOCAL_TILE_SIZE: i32 = 1 << LOCAL_COORD_BITS;
/// Rooms are addressed on an 8x8 grid, 1-based.
pub const ZONE_MIN: i32 = 1;
pub const ZONE_MAX: i32 = 8;
pub const TILES_PER_ZONE: i32 = CHUNK_SIZE * CHUNK_SIZE;
