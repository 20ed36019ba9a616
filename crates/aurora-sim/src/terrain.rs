//! Flat test terrain with a band of cold biome.

use std::ops::Range;

use aurora_core::BlockPos;

/// Infinite flat terrain. Everything at or below `surface_y` is solid; the
/// cold biome spans the X coordinates in `cold_band`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatTerrain {
    /// Height of the topmost solid layer.
    pub surface_y: i32,
    /// X range of the cold biome.
    pub cold_band: Range<i32>,
}

impl FlatTerrain {
    /// Creates terrain with the given surface height and cold band.
    pub fn new(surface_y: i32, cold_band: Range<i32>) -> Self {
        Self {
            surface_y,
            cold_band,
        }
    }

    /// Whether `pos` lies in the cold biome.
    pub fn is_cold(&self, pos: BlockPos) -> bool {
        self.cold_band.contains(&pos.x)
    }

    /// Whether `pos` is above the surface.
    pub fn is_air(&self, pos: BlockPos) -> bool {
        pos.y > self.surface_y
    }

    /// Whether `pos` rests directly on the surface.
    pub fn is_surface_slot(&self, pos: BlockPos) -> bool {
        pos.y == self.surface_y + 1
    }

    /// Standing position at column `(x, z)`.
    pub fn spawn_point(&self, x: i32, z: i32) -> BlockPos {
        BlockPos::new(x, self.surface_y + 1, z)
    }
}

impl Default for FlatTerrain {
    fn default() -> Self {
        Self::new(64, -256..256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_slots() {
        let terrain = FlatTerrain::default();
        let standing = terrain.spawn_point(3, -7);
        assert!(terrain.is_surface_slot(standing));
        assert!(terrain.is_air(standing));
        assert!(!terrain.is_air(BlockPos::new(3, 64, -7)));
    }

    #[test]
    fn test_cold_band_is_half_open() {
        let terrain = FlatTerrain::new(0, -10..10);
        assert!(terrain.is_cold(BlockPos::new(-10, 1, 0)));
        assert!(!terrain.is_cold(BlockPos::new(10, 1, 0)));
    }
}
