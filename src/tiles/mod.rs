pub mod cache;
pub mod pipeline;
pub mod provider;
pub mod source;
pub mod store;
pub mod tile;

// Re-exports for convenience
pub use cache::TileCache;
pub use pipeline::{RedrawNotifier, TileFetchPipeline};
pub use provider::{providers_from_str, TileProvider};
pub use source::TileSource;
pub use store::TileStore;
pub use tile::Tile;
