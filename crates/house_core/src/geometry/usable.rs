use tracing::info;

use super::coords::{local_to_zone_tile, zone_tile_to_local, LocalPoint, ZoneOrigin, ZoneTile};
use super::{CHUNK_SIZE, LOCAL_COORD_BITS, SCENE_SIZE};

/// Terrain height query in local units. A height of 0 means "no data".
pub trait HeightSource {
    fn height_at(&self, local_x: i32, local_y: i32, plane: i32) -> i32;
}

impl<F> HeightSource for F
where
    F: Fn(i32, i32, i32) -> i32,
{
    fn height_at(&self, local_x: i32, local_y: i32, plane: i32) -> i32 {
        self(local_x, local_y, plane)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub scene_width: i32,
    pub scene_height: i32,
    pub chunk_size: i32,
    pub plane: i32,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            scene_width: SCENE_SIZE,
            scene_height: SCENE_SIZE,
            chunk_size: CHUNK_SIZE,
            plane: 0,
        }
    }
}

/// Inclusive bounding box of usable chunks, in chunk-grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
}

impl ChunkBounds {
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> i32 {
        self.max_z - self.min_z + 1
    }
}

/// Which interior chunks of a scene belong to an actual room.
///
/// Produced by [`scan`] and never mutated afterwards; a rescan builds a new
/// map that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsableRegionMap {
    grid_width: i32,
    grid_height: i32,
    chunk_size: i32,
    usable_grid: Vec<bool>,
    usable_count: usize,
    min_usable_x: i32,
    min_usable_z: i32,
    max_usable_x: i32,
    max_usable_z: i32,
}

impl Default for UsableRegionMap {
    fn default() -> Self {
        Self::empty(0, 0, CHUNK_SIZE)
    }
}

impl UsableRegionMap {
    fn empty(grid_width: i32, grid_height: i32, chunk_size: i32) -> Self {
        let cells = grid_width.max(0) as usize * grid_height.max(0) as usize;
        Self {
            grid_width,
            grid_height,
            chunk_size,
            usable_grid: vec![false; cells],
            usable_count: 0,
            min_usable_x: i32::MAX,
            min_usable_z: i32::MAX,
            max_usable_x: -1,
            max_usable_z: -1,
        }
    }

    fn mark_usable(&mut self, grid_x: i32, grid_z: i32) {
        let Some(index) = self.index_of(grid_x, grid_z) else {
            return;
        };
        self.usable_grid[index] = true;
        self.usable_count += 1;
        self.min_usable_x = self.min_usable_x.min(grid_x);
        self.min_usable_z = self.min_usable_z.min(grid_z);
        self.max_usable_x = self.max_usable_x.max(grid_x);
        self.max_usable_z = self.max_usable_z.max(grid_z);
    }

    fn index_of(&self, grid_x: i32, grid_z: i32) -> Option<usize> {
        if grid_x < 0 || grid_z < 0 || grid_x >= self.grid_width || grid_z >= self.grid_height {
            return None;
        }
        Some(grid_z as usize * self.grid_width as usize + grid_x as usize)
    }

    pub fn grid_width(&self) -> i32 {
        self.grid_width
    }

    pub fn grid_height(&self) -> i32 {
        self.grid_height
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> usize {
        self.usable_grid.len()
    }

    pub fn usable_count(&self) -> usize {
        self.usable_count
    }

    /// The bounding box is only meaningful when at least one chunk is usable.
    pub fn is_valid(&self) -> bool {
        self.usable_count > 0
    }

    pub fn is_usable(&self, grid_x: i32, grid_z: i32) -> bool {
        self.index_of(grid_x, grid_z)
            .and_then(|index| self.usable_grid.get(index))
            .copied()
            .unwrap_or(false)
    }

    pub fn bounds(&self) -> Option<ChunkBounds> {
        if !self.is_valid() {
            return None;
        }
        Some(ChunkBounds {
            min_x: self.min_usable_x,
            min_z: self.min_usable_z,
            max_x: self.max_usable_x,
            max_z: self.max_usable_z,
        })
    }

    /// Zone (1, 1) anchor for the coordinate mapper. Zones are exactly one
    /// 8-tile chunk, so maps scanned with another chunk size have no origin.
    pub fn origin(&self) -> Option<ZoneOrigin> {
        if self.chunk_size != CHUNK_SIZE {
            return None;
        }
        let bounds = self.bounds()?;
        Some(ZoneOrigin {
            chunk_x: bounds.min_x,
            chunk_z: bounds.min_z,
        })
    }

    pub fn zone_tile_to_local(
        &self,
        zone_x: i32,
        zone_y: i32,
        tile_x: i32,
        tile_y: i32,
    ) -> Option<LocalPoint> {
        zone_tile_to_local(zone_x, zone_y, tile_x, tile_y, self.origin()?)
    }

    pub fn local_to_zone_tile(&self, point: LocalPoint) -> Option<ZoneTile> {
        local_to_zone_tile(point, self.origin()?)
    }
}

/// Classifies every interior chunk of the scene. A chunk is usable only when
/// every tile in it reports a non-zero height.
pub fn scan<H>(request: &ScanRequest, heights: &H) -> UsableRegionMap
where
    H: HeightSource + ?Sized,
{
    let chunk = request.chunk_size;
    if chunk <= 0 {
        return UsableRegionMap::empty(0, 0, chunk);
    }

    let (Some(grid_width), Some(grid_height)) = (
        interior_chunks(request.scene_width, chunk),
        interior_chunks(request.scene_height, chunk),
    ) else {
        return UsableRegionMap::empty(0, 0, chunk);
    };
    let mut map = UsableRegionMap::empty(grid_width, grid_height, chunk);

    for grid_z in 0..grid_height {
        for grid_x in 0..grid_width {
            let start_x = chunk + grid_x * chunk;
            let start_z = chunk + grid_z * chunk;
            if chunk_is_usable(heights, start_x, start_z, chunk, request.plane) {
                map.mark_usable(grid_x, grid_z);
            }
        }
    }

    log_scan_summary(&map);
    map
}

/// Chunks left after dropping one chunk on each side. `None` when the border
/// itself does not fit in an i32.
fn interior_chunks(scene_extent: i32, chunk: i32) -> Option<i32> {
    let border = chunk.checked_mul(2)?;
    Some(scene_extent.saturating_sub(border).max(0) / chunk)
}

fn chunk_is_usable<H>(heights: &H, start_x: i32, start_z: i32, chunk: i32, plane: i32) -> bool
where
    H: HeightSource + ?Sized,
{
    for tile_x in 0..chunk {
        for tile_z in 0..chunk {
            let local_x = (start_x + tile_x) << LOCAL_COORD_BITS;
            let local_z = (start_z + tile_z) << LOCAL_COORD_BITS;
            if heights.height_at(local_x, local_z, plane) == 0 {
                return false;
            }
        }
    }
    true
}

fn log_scan_summary(map: &UsableRegionMap) {
    let total = map.total_chunks();
    info!(
        grid_width = map.grid_width,
        grid_height = map.grid_height,
        total_chunks = total,
        usable_chunks = map.usable_count,
        unusable_chunks = total - map.usable_count,
        "usable_region_scanned"
    );
    if let Some(bounds) = map.bounds() {
        info!(
            width = bounds.width(),
            height = bounds.height(),
            min_x = bounds.min_x,
            min_z = bounds.min_z,
            max_x = bounds.max_x,
            max_z = bounds.max_z,
            "usable_region_bounds"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn flat(height: i32) -> impl Fn(i32, i32, i32) -> i32 {
        move |_, _, _| height
    }

    #[test]
    fn nonzero_terrain_marks_every_chunk_usable() {
        let map = scan(&ScanRequest::default(), &flat(200));

        assert_eq!(map.grid_width(), 11);
        assert_eq!(map.grid_height(), 11);
        assert_eq!(map.usable_count(), map.total_chunks());
        assert_eq!(
            map.bounds(),
            Some(ChunkBounds {
                min_x: 0,
                min_z: 0,
                max_x: 10,
                max_z: 10,
            })
        );
    }

    #[test]
    fn single_zero_tile_disqualifies_its_chunk_only() {
        // Tile (20, 20) sits in chunk-grid cell (1, 1).
        let hole_x = 20 << LOCAL_COORD_BITS;
        let hole_z = 20 << LOCAL_COORD_BITS;
        let heights = move |x: i32, z: i32, _plane: i32| {
            if x == hole_x && z == hole_z {
                0
            } else {
                50
            }
        };

        let map = scan(&ScanRequest::default(), &heights);
        assert!(!map.is_usable(1, 1));
        assert!(map.is_usable(0, 1));
        assert!(map.is_usable(2, 1));
        assert_eq!(map.usable_count(), map.total_chunks() - 1);
    }

    #[test]
    fn bounding_box_tracks_raised_block() {
        // Raise scene tiles 24..48 x 32..56, i.e. chunk-grid cells x 2..4, z 3..5.
        let heights = |x: i32, z: i32, _plane: i32| {
            let tile_x = x >> LOCAL_COORD_BITS;
            let tile_z = z >> LOCAL_COORD_BITS;
            if (24..48).contains(&tile_x) && (32..56).contains(&tile_z) {
                120
            } else {
                0
            }
        };

        let map = scan(&ScanRequest::default(), &heights);
        assert_eq!(map.usable_count(), 9);
        let bounds = map.bounds().expect("valid bounds");
        assert_eq!((bounds.min_x, bounds.min_z), (2, 3));
        assert_eq!((bounds.max_x, bounds.max_z), (4, 5));
        assert_eq!(map.origin(), Some(ZoneOrigin { chunk_x: 2, chunk_z: 3 }));
    }

    #[test]
    fn all_zero_terrain_yields_invalid_map() {
        let map = scan(&ScanRequest::default(), &flat(0));
        assert_eq!(map.usable_count(), 0);
        assert!(!map.is_valid());
        assert!(map.bounds().is_none());
        assert!(map.origin().is_none());
        assert!(map.zone_tile_to_local(1, 1, 0, 0).is_none());
        assert!(map
            .local_to_zone_tile(LocalPoint { x: 2048, y: 2048 })
            .is_none());
    }

    #[test]
    fn scene_smaller_than_border_has_empty_grid() {
        let request = ScanRequest {
            scene_width: 12,
            scene_height: 12,
            ..ScanRequest::default()
        };
        let map = scan(&request, &flat(10));
        assert_eq!(map.total_chunks(), 0);
        assert!(!map.is_valid());
    }

    #[test]
    fn non_positive_chunk_size_is_degraded_not_a_panic() {
        let request = ScanRequest {
            chunk_size: 0,
            ..ScanRequest::default()
        };
        let map = scan(&request, &flat(10));
        assert_eq!(map.total_chunks(), 0);
        assert!(!map.is_valid());

        let huge = ScanRequest {
            chunk_size: 2_000_000_000,
            ..ScanRequest::default()
        };
        let map = scan(&huge, &flat(10));
        assert_eq!(map.total_chunks(), 0);
        assert!(!map.is_valid());

        let wide = ScanRequest {
            scene_width: i32::MIN,
            scene_height: i32::MAX,
            chunk_size: 1_000_000_000,
            plane: 0,
        };
        assert_eq!(scan(&wide, &flat(10)).total_chunks(), 0);
    }

    #[test]
    fn other_chunk_sizes_scan_but_have_no_zone_origin() {
        let request = ScanRequest {
            chunk_size: 4,
            ..ScanRequest::default()
        };
        let map = scan(&request, &flat(10));
        assert!(map.is_valid());
        assert!(map.origin().is_none());
    }

    #[test]
    fn scanner_samples_tile_corners_on_requested_plane() {
        let samples = RefCell::new(Vec::new());
        let heights = |x: i32, z: i32, plane: i32| {
            samples.borrow_mut().push((x, z, plane));
            1
        };
        let request = ScanRequest {
            scene_width: 24,
            scene_height: 24,
            chunk_size: 8,
            plane: 2,
        };

        let map = scan(&request, &heights);
        assert_eq!(map.total_chunks(), 1);
        let samples = samples.into_inner();
        assert_eq!(samples.len(), 64);
        assert!(samples.iter().all(|(x, z, plane)| {
            *plane == 2 && x % 128 == 0 && z % 128 == 0 && *x >= 8 * 128 && *z >= 8 * 128
        }));
    }
}
