use std::fs;
use std::path::{Path, PathBuf};

use crate::core::geo::TileCoord;

/// On-disk tile store holding raw encoded bytes exactly as fetched, laid out
/// as `<root>/tiles/<providerCode>/<zoom>/<x>-<y>`.
///
/// Persistence is best-effort: a failed write is logged and swallowed, and a
/// missing file simply means the tile will be fetched from the network again.
#[derive(Debug, Clone)]
pub struct TileStore {
    root: PathBuf,
}

impl TileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn tile_path(&self, code: &str, coord: TileCoord) -> PathBuf {
        self.root
            .join("tiles")
            .join(code)
            .join(coord.z.to_string())
            .join(format!("{}-{}", coord.x, coord.y))
    }

    /// Reads the stored bytes for a tile, if present.
    pub fn load(&self, code: &str, coord: TileCoord) -> Option<Vec<u8>> {
        let path = self.tile_path(code, coord);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::debug!("failed to read cached tile {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Writes the raw bytes for a tile. Errors are logged and swallowed.
    pub fn save(&self, code: &str, coord: TileCoord, bytes: &[u8]) {
        let path = self.tile_path(code, coord);
        let result = path
            .parent()
            .map(fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| fs::write(&path, bytes));
        if let Err(e) = result {
            log::warn!("failed to persist tile {}: {}", path.display(), e);
        }
    }
}

impl AsRef<Path> for TileStore {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}
