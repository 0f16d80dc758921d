//! # rastermap
//!
//! Core engine pieces for a geo-referenced raster map viewer: a concurrent
//! tile acquisition/cache pipeline for tile-server maps and a degree-bucketed
//! spatial index that picks the best calibrated map for a viewport.
//!
//! Rendering, calibration-file parsing and projection math are external
//! collaborators; this crate hands them decoded tiles and ranked maps.

pub mod core;
pub mod maps;
pub mod prelude;
pub mod tiles;

// Re-export public API
pub use crate::core::geo::{LatLng, LatLngBounds, TileCoord};

pub use maps::{calibrated::CalibratedMap, index::MapIndex};

pub use tiles::{
    cache::TileCache,
    pipeline::{RedrawNotifier, TileFetchPipeline},
    provider::TileProvider,
    source::TileSource,
    store::TileStore,
    tile::Tile,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid provider line: {0}")]
    Provider(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

/// Error type alias for convenience
pub type Error = MapError;
