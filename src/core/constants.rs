//! Engine-wide magic numbers kept in a single place.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level the 64-bit tile key can address (24 bits per axis).
pub const MAX_KEY_ZOOM: u8 = 24;

/// Number of long-running fetch workers in the pipeline.
pub const DEFAULT_WORKERS: usize = 4;

/// Cache capacity slack over the visible tile count, to absorb panning.
pub const CACHE_SLACK: usize = 4;
