use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::RwLock;

use fxhash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::core::geo::LatLngBounds;
use crate::maps::calibrated::CalibratedMap;
use crate::Result;

/// One bucket per whole degree of latitude and longitude.
const GRID_LATS: i32 = 181;
const GRID_LONS: i32 = 361;

/// Heuristic thresholds for picking an alternative map, preserved from field
/// experience rather than derived from anything physical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageTuning {
    /// Maps coarser than this (meters per pixel) are never offered.
    pub max_mpp: f64,
    /// Minimum reference/candidate resolution ratio when the reference no
    /// longer covers the viewport.
    pub detail_ratio: f64,
    /// Ratio above which a candidate is finer than the reference and always
    /// worth offering.
    pub replace_ratio: f64,
    /// Ratio cap: candidates this much finer than the reference are too
    /// zoomed-in to be useful.
    pub max_ratio: f64,
}

impl Default for CoverageTuning {
    fn default() -> Self {
        Self {
            max_mpp: 200.0,
            detail_ratio: 0.2,
            replace_ratio: 1.0,
            max_ratio: 5.0,
        }
    }
}

#[derive(Debug)]
struct Inner {
    /// `GRID_LATS * GRID_LONS` sets of map ids, row-major by latitude cell.
    grid: Vec<HashSet<u32>>,
    maps: HashMap<u32, CalibratedMap>,
    /// Checksum of the backing file collection, see [`maps_hash`].
    hash: u64,
}

/// Degree-bucketed spatial index over an arbitrary collection of calibrated
/// maps.
///
/// A map id is present in bucket `(lat, lon)` iff the map loaded cleanly and
/// its bounding box, expanded to whole-degree cells, intersects that cell.
/// Reads (every viewport change) vastly outnumber writes (collection
/// changes), so the structure is guarded by a reader-writer lock.
#[derive(Debug)]
pub struct MapIndex {
    inner: RwLock<Inner>,
    tuning: CoverageTuning,
}

impl MapIndex {
    pub fn new() -> Self {
        Self::with_tuning(CoverageTuning::default())
    }

    pub fn with_tuning(tuning: CoverageTuning) -> Self {
        Self {
            inner: RwLock::new(Inner {
                grid: vec![HashSet::new(); (GRID_LATS * GRID_LONS) as usize],
                maps: HashMap::new(),
                hash: 0,
            }),
            tuning,
        }
    }

    /// Adds a map to the index. No-op if the id is already present.
    ///
    /// Maps carrying a `load_error` are recorded in the id table only. Bounds
    /// outside -90..90 / -180..180 flag the map with a `load_error` instead of
    /// bucketing it.
    pub fn add_map(&self, mut map: CalibratedMap) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        if inner.maps.contains_key(&map.id) {
            return;
        }
        if map.load_error.is_some() {
            inner.maps.insert(map.id, map);
            return;
        }

        match cell_rect(&map.bounds) {
            Some(rect) => {
                let id = map.id;
                for bucket in rect_buckets(rect) {
                    inner.grid[bucket].insert(id);
                }
            }
            None => {
                log::error!(
                    "map {} ({:?}) has out-of-range bounds, flagging as bad",
                    map.id,
                    map.path
                );
                map.load_error = Some("calibration bounds out of range".to_string());
            }
        }
        inner.maps.insert(map.id, map);
    }

    /// Removes a map from the id table and from every bucket it occupies.
    /// Tolerates maps that were never bucketed.
    pub fn remove_map(&self, id: u32) -> Option<CalibratedMap> {
        let mut inner = self.inner.write().ok()?;
        let map = inner.maps.remove(&id)?;
        if map.load_error.is_none() {
            if let Some(rect) = cell_rect(&map.bounds) {
                for bucket in rect_buckets(rect) {
                    inner.grid[bucket].remove(&id);
                }
            }
        }
        Some(map)
    }

    /// All maps covering the given point, finest resolution first.
    ///
    /// Floor and ceil on both axes mean a point exactly on a degree boundary
    /// consults up to four buckets.
    pub fn get_maps(&self, lat: f64, lon: f64) -> Vec<CalibratedMap> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for cell_lat in lat.floor() as i64..=lat.ceil() as i64 {
            for cell_lon in lon.floor() as i64..=lon.ceil() as i64 {
                let Some(bucket) = bucket_index(cell_lat as i32, cell_lon as i32) else {
                    continue;
                };
                for &id in &inner.grid[bucket] {
                    if !seen.insert(id) {
                        continue;
                    }
                    if let Some(map) = inner.maps.get(&id) {
                        if map.covers_lat_lon(lat, lon) {
                            found.push(map.clone());
                        }
                    }
                }
            }
        }

        found.sort_by(|a, b| a.mpp.total_cmp(&b.mpp));
        found
    }

    /// Alternative maps that could replace `reference` over `area`, finest
    /// first.
    ///
    /// `covered` says the reference still covers the whole viewport;
    /// `best_match` asks for the closest-resolution candidate even then. The
    /// ratio band comes from [`CoverageTuning`].
    pub fn get_covering_maps(
        &self,
        reference: &CalibratedMap,
        area: &LatLngBounds,
        covered: bool,
        best_match: bool,
    ) -> Vec<CalibratedMap> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let Some(rect) = cell_rect_clamped(area) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for bucket in rect_buckets(rect) {
            for &id in &inner.grid[bucket] {
                if !seen.insert(id) || id == reference.id {
                    continue;
                }
                let Some(map) = inner.maps.get(&id) else {
                    continue;
                };
                if map.mpp > self.tuning.max_mpp {
                    continue;
                }
                let ratio = reference.mpp / map.mpp;
                if !((!covered && ratio > self.tuning.detail_ratio)
                    || ratio > self.tuning.replace_ratio)
                {
                    continue;
                }
                if (best_match || !covered) && ratio >= self.tuning.max_ratio {
                    continue;
                }
                // The expensive geometric check comes last.
                if !map.contains_area(area) {
                    continue;
                }
                found.push(map.clone());
            }
        }

        found.sort_by(|a, b| b.mpp.total_cmp(&a.mpp));
        found
    }

    /// Removes every map currently carrying a `load_error`. This is the
    /// recovery path after a bulk load left failed entries behind.
    pub fn clean_bad_maps(&self) {
        let bad: Vec<u32> = match self.inner.read() {
            Ok(inner) => inner
                .maps
                .values()
                .filter(|m| m.load_error.is_some())
                .map(|m| m.id)
                .collect(),
            Err(_) => return,
        };
        for id in bad {
            self.remove_map(id);
        }
    }

    /// Drops every map and empties the grid.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.maps.clear();
            for bucket in inner.grid.iter_mut() {
                bucket.clear();
            }
            inner.hash = 0;
        }
    }

    pub fn get(&self, id: u32) -> Option<CalibratedMap> {
        self.inner.read().ok()?.maps.get(&id).cloned()
    }

    pub fn all_maps(&self) -> Vec<CalibratedMap> {
        match self.inner.read() {
            Ok(inner) => inner.maps.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.maps.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checksum of the backing map file collection, set at scan time. Callers
    /// compare it against [`maps_hash`] of a fresh directory listing to skip
    /// a full rescan when nothing changed on disk.
    pub fn hash(&self) -> u64 {
        self.inner.read().map(|inner| inner.hash).unwrap_or(0)
    }

    pub fn set_hash(&self, hash: u64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.hash = hash;
        }
    }

    /// Persists the map table and checksum as JSON. A poisoned lock fails the
    /// call before the file is touched, so an existing snapshot survives.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = {
            let inner = self.inner.read().map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::Other, "map index lock poisoned")
            })?;
            let mut maps: Vec<CalibratedMap> = inner.maps.values().cloned().collect();
            maps.sort_by_key(|m| m.id);
            IndexSnapshot {
                hash: inner.hash,
                maps,
            }
        };
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(file, &snapshot)?;
        Ok(())
    }

    /// Loads a persisted index, rebuilding the bucket grid from the stored
    /// map table.
    pub fn load_from(path: impl AsRef<Path>, tuning: CoverageTuning) -> Result<MapIndex> {
        let file = BufReader::new(File::open(path)?);
        let snapshot: IndexSnapshot = serde_json::from_reader(file)?;
        let index = MapIndex::with_tuning(tuning);
        for map in snapshot.maps {
            index.add_map(map);
        }
        index.set_hash(snapshot.hash);
        Ok(index)
    }
}

impl Default for MapIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    hash: u64,
    maps: Vec<CalibratedMap>,
}

/// Checksum over the sorted absolute paths of the backing map files.
pub fn maps_hash<P: AsRef<Path>>(paths: &[P]) -> u64 {
    let mut sorted: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
    sorted.sort();
    let mut hasher = FxHasher::default();
    for path in sorted {
        path.hash(&mut hasher);
    }
    hasher.finish()
}

/// Whole-degree cell rectangle of a bounding box, or `None` when any part of
/// it falls outside the supported -90..90 / -180..180 range.
fn cell_rect(bounds: &LatLngBounds) -> Option<(i32, i32, i32, i32)> {
    let min_lat = bounds.south_west.lat.floor() as i32;
    let max_lat = bounds.north_east.lat.ceil() as i32;
    let min_lon = bounds.south_west.lng.floor() as i32;
    let max_lon = bounds.north_east.lng.ceil() as i32;
    if min_lat < -90 || max_lat > 90 || min_lon < -180 || max_lon > 180 || min_lat > max_lat {
        return None;
    }
    Some((min_lat, max_lat, min_lon, max_lon))
}

/// Like [`cell_rect`] but clamps a partially out-of-range query area to the
/// grid instead of rejecting it.
fn cell_rect_clamped(bounds: &LatLngBounds) -> Option<(i32, i32, i32, i32)> {
    let min_lat = (bounds.south_west.lat.floor() as i32).max(-90);
    let max_lat = (bounds.north_east.lat.ceil() as i32).min(90);
    let min_lon = (bounds.south_west.lng.floor() as i32).max(-180);
    let max_lon = (bounds.north_east.lng.ceil() as i32).min(180);
    if min_lat > max_lat || min_lon > max_lon {
        return None;
    }
    Some((min_lat, max_lat, min_lon, max_lon))
}

fn bucket_index(lat: i32, lon: i32) -> Option<usize> {
    if !(-90..=90).contains(&lat) || !(-180..=180).contains(&lon) {
        return None;
    }
    Some(((lat + 90) * GRID_LONS + lon + 180) as usize)
}

fn rect_buckets((min_lat, max_lat, min_lon, max_lon): (i32, i32, i32, i32)) -> Vec<usize> {
    let mut buckets = Vec::new();
    for lat in min_lat..=max_lat {
        for lon in min_lon..=max_lon {
            if let Some(bucket) = bucket_index(lat, lon) {
                buckets.push(bucket);
            }
        }
    }
    buckets
}
