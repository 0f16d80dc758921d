use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::geo::{LatLng, LatLngBounds};

/// Metadata handle for one locally calibrated raster map.
///
/// The actual pixels and the calibration parsing live in an external loader;
/// the index only needs identity, bounds, resolution and the coverage
/// predicates. `load_error` marks a map whose calibration could not be used:
/// such maps are kept around for later reload or removal but never take part
/// in spatial queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedMap {
    pub id: u32,
    /// Absolute path of the calibration file this map was loaded from.
    pub path: PathBuf,
    pub title: String,
    pub bounds: LatLngBounds,
    /// Ground resolution in meters per pixel.
    pub mpp: f64,
    pub load_error: Option<String>,
}

impl CalibratedMap {
    pub fn new(
        id: u32,
        path: impl Into<PathBuf>,
        title: impl Into<String>,
        bounds: LatLngBounds,
        mpp: f64,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            title: title.into(),
            bounds,
            mpp,
            load_error: None,
        }
    }

    /// Whether this map covers the given geographic point.
    pub fn covers_lat_lon(&self, lat: f64, lon: f64) -> bool {
        self.bounds.contains(&LatLng::new(lat, lon))
    }

    /// Whether this map fully contains the given area.
    pub fn contains_area(&self, area: &LatLngBounds) -> bool {
        self.bounds.contains_bounds(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_predicates() {
        let map = CalibratedMap::new(
            1,
            "/maps/test.map",
            "Test",
            LatLngBounds::from_coords(50.0, 10.0, 52.0, 14.0),
            10.0,
        );

        assert!(map.covers_lat_lon(51.0, 12.0));
        assert!(!map.covers_lat_lon(49.0, 12.0));
        assert!(map.contains_area(&LatLngBounds::from_coords(50.5, 11.0, 51.5, 13.0)));
        assert!(!map.contains_area(&LatLngBounds::from_coords(49.0, 11.0, 51.0, 13.0)));
    }
}
