//! Re-exports of the most commonly used types for `use rastermap::prelude::*;`.

pub use crate::core::constants::{DEFAULT_WORKERS, TILE_SIZE};
pub use crate::core::geo::{LatLng, LatLngBounds, TileCoord};

pub use crate::maps::{
    calibrated::CalibratedMap,
    index::{maps_hash, CoverageTuning, MapIndex},
};

pub use crate::tiles::{
    cache::TileCache,
    pipeline::{PipelineConfig, RedrawNotifier, TileFetchPipeline},
    provider::{providers_from_str, TileProvider},
    source::TileSource,
    store::TileStore,
    tile::Tile,
};

pub use crate::{MapError, Result};
