pub mod calibrated;
pub mod index;

// Re-exports for convenience
pub use calibrated::CalibratedMap;
pub use index::{maps_hash, CoverageTuning, MapIndex};
