use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::MAX_KEY_ZOOM;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    /// Checks if the bounds fully contain another bounds
    pub fn contains_bounds(&self, other: &LatLngBounds) -> bool {
        self.contains(&other.south_west) && self.contains(&other.north_east)
    }

    /// Checks if the bounds intersect with another bounds
    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        !(other.north_east.lat < self.south_west.lat
            || other.south_west.lat > self.north_east.lat
            || other.north_east.lng < self.south_west.lng
            || other.south_west.lng > self.north_east.lng)
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

/// Represents a tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Packs the coordinate into a single 64-bit key: `z << 48 | y << 24 | x`.
    ///
    /// 24 bits per axis cover every tile up to zoom [`MAX_KEY_ZOOM`], so the
    /// mapping is injective for all valid coordinates.
    pub fn key(&self) -> u64 {
        (self.z as u64) << 48 | (self.y as u64) << 24 | (self.x as u64 & 0xFF_FFFF)
    }

    /// Inverts [`TileCoord::key`].
    pub fn from_key(key: u64) -> Self {
        Self {
            x: (key & 0xFF_FFFF) as u32,
            y: (key >> 24 & 0xFF_FFFF) as u32,
            z: (key >> 48) as u8,
        }
    }

    /// Creates a tile coordinate from a LatLng and zoom level
    pub fn from_lat_lng(lat_lng: &LatLng, zoom: u8) -> Self {
        let lat_rad = lat_lng.lat.clamp(-85.0511287798, 85.0511287798).to_radians();
        let n = 2_f64.powi(zoom as i32);

        let x = ((lat_lng.lng + 180.0) / 360.0 * n).floor() as u32;
        let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor() as u32;

        Self::new(x, y, zoom)
    }

    /// Converts tile coordinate to LatLng (northwest corner)
    pub fn to_lat_lng(&self) -> LatLng {
        let n = 2_f64.powi(self.z as i32);
        let lng = self.x as f64 / n * 360.0 - 180.0;
        let lat_rad = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan();

        LatLng::new(lat_rad.to_degrees(), lng)
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        let max_coord = 2_u64.pow(self.z as u32);
        self.z <= MAX_KEY_ZOOM && (self.x as u64) < max_coord && (self.y as u64) < max_coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let coords = [
            TileCoord::new(0, 0, 0),
            TileCoord::new(5, 5, 5),
            TileCoord::new(2, 3, 2),
            TileCoord::new((1 << 24) - 1, (1 << 24) - 1, 24),
        ];
        for coord in coords {
            assert_eq!(TileCoord::from_key(coord.key()), coord);
        }
    }

    #[test]
    fn test_key_injective_within_zoom() {
        // All tiles of a small pyramid must map to distinct keys.
        let mut seen = std::collections::HashSet::new();
        for z in 0..=4u8 {
            let n = 1u32 << z;
            for x in 0..n {
                for y in 0..n {
                    assert!(seen.insert(TileCoord::new(x, y, z).key()));
                }
            }
        }
    }

    #[test]
    fn test_key_matches_bit_layout() {
        let coord = TileCoord::new(3, 7, 12);
        assert_eq!(coord.key(), (12u64 << 48) | (7u64 << 24) | 3u64);
    }

    #[test]
    fn test_tile_coord_conversion() {
        let lat_lng = LatLng::new(40.7128, -74.0060);
        let tile = TileCoord::from_lat_lng(&lat_lng, 10);
        let back = tile.to_lat_lng();

        // Should be reasonably close (within tile boundaries)
        assert!((back.lat - lat_lng.lat).abs() < 1.0);
        assert!((back.lng - lat_lng.lng).abs() < 1.0);
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = LatLngBounds::from_coords(40.0, -75.0, 41.0, -73.0);
        let inside = LatLng::new(40.5, -74.0);
        let outside = LatLng::new(42.0, -74.0);

        assert!(bounds.contains(&inside));
        assert!(!bounds.contains(&outside));
    }

    #[test]
    fn test_bounds_contains_bounds() {
        let outer = LatLngBounds::from_coords(40.0, -75.0, 41.0, -73.0);
        let inner = LatLngBounds::from_coords(40.2, -74.5, 40.8, -73.5);
        let crossing = LatLngBounds::from_coords(40.5, -74.0, 42.0, -73.5);

        assert!(outer.contains_bounds(&inner));
        assert!(!outer.contains_bounds(&crossing));
        assert!(!inner.contains_bounds(&outer));
    }
}
