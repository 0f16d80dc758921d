use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::core::constants::{CACHE_SLACK, TILE_SIZE};
use crate::tiles::tile::Tile;

/// Fixed-capacity LRU cache of decoded tiles, shared between the render
/// thread and the fetch workers.
///
/// `destroy()` drops every held payload and leaves the cache dead: later
/// `get`/`put` calls are no-ops, so workers finishing an in-flight fetch
/// after teardown simply have their result discarded.
#[derive(Debug)]
pub struct TileCache {
    cache: Mutex<Option<LruCache<u64, Arc<Tile>>>>,
}

impl TileCache {
    /// Create a new tile cache holding at most `capacity` tiles. A zero
    /// capacity is clamped to one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(Some(LruCache::new(capacity))),
        }
    }

    /// Size the cache for a viewport: visible tile count times a slack factor
    /// so panning does not immediately evict tiles that scroll back in.
    pub fn for_viewport(width_px: u32, height_px: u32, tile_size: u32) -> Self {
        let tile_size = if tile_size == 0 { TILE_SIZE } else { tile_size };
        let visible = (width_px as usize * height_px as usize)
            / (tile_size as usize * tile_size as usize);
        Self::new(visible.max(1) * CACHE_SLACK)
    }

    /// Get a tile from the cache, refreshing its recency
    pub fn get(&self, key: u64) -> Option<Arc<Tile>> {
        let mut guard = self.cache.lock().ok()?;
        guard.as_mut()?.get(&key).cloned()
    }

    /// Insert a tile, evicting least-recently-used entries beyond capacity
    pub fn put(&self, tile: Arc<Tile>) {
        if let Ok(mut guard) = self.cache.lock() {
            if let Some(cache) = guard.as_mut() {
                cache.put(tile.key(), tile);
            }
        }
    }

    pub fn contains(&self, key: u64) -> bool {
        match self.cache.lock() {
            Ok(guard) => guard.as_ref().map(|c| c.contains(&key)).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Get the current number of cached tiles
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|c| c.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|c| c.cap().get()))
            .unwrap_or(0)
    }

    /// Drop all entries but keep the cache usable
    pub fn clear(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            if let Some(cache) = guard.as_mut() {
                cache.clear();
            }
        }
    }

    /// Release every payload and kill the cache. Safe to call while workers
    /// are still completing fetches; their insertions are dropped.
    pub fn destroy(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = None;
        }
    }
}
