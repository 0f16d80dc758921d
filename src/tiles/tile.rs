use std::sync::{Arc, OnceLock};

use image::DynamicImage;

use crate::core::geo::TileCoord;

/// A single tile of a tile pyramid.
///
/// A tile starts out pending (no payload) when first requested, and the worker
/// that owns its fetch attaches the decoded image exactly once. The pipeline
/// shares tiles as `Arc<Tile>`, so the placeholder handed back to the caller
/// on a cache miss is the same object that later becomes ready.
#[derive(Debug)]
pub struct Tile {
    pub coord: TileCoord,
    image: OnceLock<Arc<DynamicImage>>,
}

impl Tile {
    /// Creates a pending tile for `coord`.
    pub fn pending(coord: TileCoord) -> Self {
        Self {
            coord,
            image: OnceLock::new(),
        }
    }

    /// Creates a tile that is ready from the start (disk cache fast path).
    pub fn ready(coord: TileCoord, image: DynamicImage) -> Self {
        let tile = Self::pending(coord);
        let _ = tile.image.set(Arc::new(image));
        tile
    }

    /// Attaches the decoded payload. Only the first call has any effect.
    pub fn fulfill(&self, image: DynamicImage) {
        let _ = self.image.set(Arc::new(image));
    }

    pub fn is_ready(&self) -> bool {
        self.image.get().is_some()
    }

    /// The decoded payload, if the fetch has completed.
    pub fn image(&self) -> Option<Arc<DynamicImage>> {
        self.image.get().cloned()
    }

    pub fn key(&self) -> u64 {
        self.coord.key()
    }
}
