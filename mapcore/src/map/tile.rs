//! Tile coordinate system: fractional tile points and concrete raster tile ids

use serde::{Deserialize, Serialize};

use super::coords::repeat;

/// Fractional position on the tile grid of one zoom level.
///
/// Kept as floats so sub-tile pan and zoom positions are representable; only
/// `to_tile_id` truncates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
    pub zoom: i32,
}

impl TilePoint {
    pub const fn new(x: f64, y: f64, zoom: i32) -> Self {
        Self { x, y, zoom }
    }

    /// Number of tiles along one axis at this zoom
    pub fn max_tiles(&self) -> f64 {
        max_tiles(self.zoom)
    }

    /// Same position expressed at another zoom
    pub fn to_zoom(&self, zoom: i32) -> TilePoint {
        let scale = 2.0_f64.powi(zoom - self.zoom);
        TilePoint::new(self.x * scale, self.y * scale, zoom)
    }

    /// Position on the parent level, used when a tile is missing
    pub fn parent(&self) -> TilePoint {
        TilePoint::new(self.x / 2.0, self.y / 2.0, self.zoom - 1)
    }

    /// Concrete tile containing this point plus the position inside it in [0, 1)
    pub fn to_tile_id(&self) -> (TileId, [f64; 2]) {
        let n = self.max_tiles();
        let x = repeat(self.x, n);
        let y = self.y.clamp(0.0, n - f64::EPSILON * n);
        let (ix, iy) = (x.floor(), y.floor());
        let id = TileId::new(ix as u32, iy as u32, self.zoom.max(0) as u8);
        (id, [x - ix, y - iy])
    }
}

/// Tiles per axis at `zoom`
pub fn max_tiles(zoom: i32) -> f64 {
    2.0_f64.powi(zoom)
}

/// Unique identifier for a map tile
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileId {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Get parent tile at a lower zoom level
    pub fn parent_at_zoom(&self, target_z: u8) -> Option<TileId> {
        if target_z >= self.z {
            return None;
        }
        let diff = self.z - target_z;
        Some(TileId {
            x: self.x >> diff,
            y: self.y >> diff,
            z: target_z,
        })
    }

    /// UV rectangle `(u0, v0, u1, v1)` this tile covers inside `parent`,
    /// for drawing a parent tile as a fallback
    pub fn sub_region(&self, parent: &TileId) -> (f32, f32, f32, f32) {
        if parent.z >= self.z {
            return (0.0, 0.0, 1.0, 1.0);
        }

        let zoom_diff = self.z - parent.z;
        let subdivisions = 1_u32 << zoom_diff;

        let local_x = self.x % subdivisions;
        let local_y = self.y % subdivisions;

        let size = 1.0 / subdivisions as f32;
        let u0 = local_x as f32 * size;
        let v0 = local_y as f32 * size;

        (u0, v0, u0 + size, v0 + size)
    }
}

/// Wrap X coordinate for infinite horizontal scrolling
pub fn wrap_tile_x(x: i64, zoom: u8) -> u32 {
    let max_tiles = 1_i64 << zoom;
    x.rem_euclid(max_tiles) as u32
}

/// Check if Y coordinate is valid (no wrapping for latitude)
pub fn is_valid_tile_y(y: i64, zoom: u8) -> bool {
    let max_tiles = 1_i64 << zoom;
    y >= 0 && y < max_tiles
}
