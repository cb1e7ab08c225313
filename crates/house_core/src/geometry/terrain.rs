use thiserror::Error;

use super::usable::HeightSource;
use super::{LOCAL_COORD_BITS, LOCAL_TILE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TerrainError {
    #[error("vertex count mismatch: expected {expected}, got {actual}")]
    VertexCountMismatch { expected: usize, actual: usize },
    #[error("plane {plane} out of range (grid has {planes} planes)")]
    PlaneOutOfRange { plane: i32, planes: i32 },
}

/// Per-plane terrain vertex heights for a scene of `size_x` by `size_y` tiles.
///
/// Each plane stores `(size_x + 1) * (size_y + 1)` vertices, row-major by y.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileHeightGrid {
    size_x: i32,
    size_y: i32,
    planes: i32,
    vertices: Vec<i32>,
}

impl TileHeightGrid {
    pub fn new(
        size_x: i32,
        size_y: i32,
        planes: i32,
        vertices: Vec<i32>,
    ) -> Result<Self, TerrainError> {
        let expected = vertex_count(size_x, size_y, planes);
        let actual = vertices.len();
        if expected != actual {
            return Err(TerrainError::VertexCountMismatch { expected, actual });
        }
        Ok(Self {
            size_x: size_x.max(0),
            size_y: size_y.max(0),
            planes: planes.max(0),
            vertices,
        })
    }

    pub fn flat(size_x: i32, size_y: i32, planes: i32, height: i32) -> Self {
        Self {
            size_x: size_x.max(0),
            size_y: size_y.max(0),
            planes: planes.max(0),
            vertices: vec![height; vertex_count(size_x, size_y, planes)],
        }
    }

    pub fn size_x(&self) -> i32 {
        self.size_x
    }

    pub fn size_y(&self) -> i32 {
        self.size_y
    }

    pub fn planes(&self) -> i32 {
        self.planes
    }

    fn vertex_index(&self, plane: i32, x: i32, y: i32) -> Option<usize> {
        if plane < 0 || plane >= self.planes {
            return None;
        }
        if x < 0 || y < 0 || x > self.size_x || y > self.size_y {
            return None;
        }
        let stride = (self.size_x + 1) as usize;
        let per_plane = stride * (self.size_y + 1) as usize;
        Some(plane as usize * per_plane + y as usize * stride + x as usize)
    }

    pub fn vertex(&self, plane: i32, x: i32, y: i32) -> Option<i32> {
        self.vertex_index(plane, x, y)
            .and_then(|index| self.vertices.get(index).copied())
    }

    /// Sets every vertex touching the inclusive tile rectangle, flattening those
    /// tiles to `height`. The rectangle is clipped to the grid.
    pub fn raise_tiles(
        &mut self,
        plane: i32,
        min_tile: (i32, i32),
        max_tile: (i32, i32),
        height: i32,
    ) -> Result<(), TerrainError> {
        if plane < 0 || plane >= self.planes {
            return Err(TerrainError::PlaneOutOfRange {
                plane,
                planes: self.planes,
            });
        }
        let min_x = min_tile.0.max(0);
        let min_y = min_tile.1.max(0);
        let max_x = max_tile.0.saturating_add(1).min(self.size_x);
        let max_y = max_tile.1.saturating_add(1).min(self.size_y);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if let Some(index) = self.vertex_index(plane, x, y) {
                    self.vertices[index] = height;
                }
            }
        }
        Ok(())
    }
}

impl HeightSource for TileHeightGrid {
    /// Bilinear height between the four corner vertices of the tile under the
    /// point. Points outside the grid have no data and report 0.
    fn height_at(&self, local_x: i32, local_y: i32, plane: i32) -> i32 {
        let scene_x = local_x >> LOCAL_COORD_BITS;
        let scene_y = local_y >> LOCAL_COORD_BITS;
        if scene_x < 0 || scene_y < 0 || scene_x >= self.size_x || scene_y >= self.size_y {
            return 0;
        }
        let corner = |dx: i32, dy: i32| self.vertex(plane, scene_x + dx, scene_y + dy);
        let (Some(h00), Some(h10), Some(h01), Some(h11)) =
            (corner(0, 0), corner(1, 0), corner(0, 1), corner(1, 1))
        else {
            return 0;
        };

        let x = i64::from(local_x & (LOCAL_TILE_SIZE - 1));
        let y = i64::from(local_y & (LOCAL_TILE_SIZE - 1));
        let south = blend(i64::from(h00), i64::from(h10), x);
        let north = blend(i64::from(h01), i64::from(h11), x);
        // A blend never leaves the range of its inputs, so this narrows exactly.
        blend(south, north, y) as i32
    }
}

/// Fixed-point lerp from `low` to `high` by `fraction` / 128. Widened so any
/// pair of i32 heights stays in range.
fn blend(low: i64, high: i64, fraction: i64) -> i64 {
    let full = i64::from(LOCAL_TILE_SIZE);
    (fraction * high + (full - fraction) * low) >> LOCAL_COORD_BITS
}

fn vertex_count(size_x: i32, size_y: i32, planes: i32) -> usize {
    let per_plane = (size_x.max(0) as usize + 1) * (size_y.max(0) as usize + 1);
    planes.max(0) as usize * per_plane
}
