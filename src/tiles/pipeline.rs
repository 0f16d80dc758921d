use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::DynamicImage;
use once_cell::sync::Lazy;

use crate::core::constants::DEFAULT_WORKERS;
use crate::core::geo::TileCoord;
use crate::tiles::cache::TileCache;
use crate::tiles::provider::TileProvider;
use crate::tiles::source::TileSource;
use crate::tiles::store::TileStore;
use crate::tiles::tile::Tile;
use crate::Result;

/// Shared blocking HTTP client with a custom User-Agent so that public tile
/// servers don't reject the request. Building the client once avoids the cost
/// of TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent("rastermap/0.1")
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build reqwest blocking client")
});

/// Fire-and-forget redraw notification sink owned by the rendering layer.
///
/// Workers call this from their own threads when a tile becomes ready; the
/// implementation must only schedule a repaint, never touch render state
/// directly.
pub trait RedrawNotifier: Send + Sync {
    fn request_redraw(&self);
}

enum Job {
    Fetch { tile: Arc<Tile>, epoch: u64 },
    Shutdown,
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of long-running fetch workers.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Turns tile cache misses into satisfied cache entries without ever blocking
/// the caller on the network.
///
/// At most one fetch is outstanding per tile key: a miss registers a pending
/// placeholder in the in-flight table, and concurrent requests for the same
/// address get that placeholder back instead of spawning a second fetch.
/// Failures leave no trace, so the next render pass naturally retries.
pub struct TileFetchPipeline {
    provider: Arc<TileProvider>,
    cache: Arc<TileCache>,
    store: TileStore,
    inflight: Arc<Mutex<HashMap<u64, Arc<Tile>>>>,
    job_tx: Sender<Job>,
    job_rx: Receiver<Job>,
    epoch: Arc<AtomicU64>,
    workers: Vec<JoinHandle<()>>,
}

impl TileFetchPipeline {
    pub fn new(
        provider: Arc<TileProvider>,
        cache: Arc<TileCache>,
        store: TileStore,
        notifier: Arc<dyn RedrawNotifier>,
    ) -> Self {
        Self::with_config(provider, cache, store, notifier, PipelineConfig::default())
    }

    pub fn with_config(
        provider: Arc<TileProvider>,
        cache: Arc<TileCache>,
        store: TileStore,
        notifier: Arc<dyn RedrawNotifier>,
        config: PipelineConfig,
    ) -> Self {
        let (job_tx, job_rx) = unbounded();
        let inflight = Arc::new(Mutex::new(HashMap::new()));
        let epoch = Arc::new(AtomicU64::new(0));

        let workers = (0..config.workers)
            .map(|_| {
                let worker = FetchWorker {
                    provider: provider.clone(),
                    cache: cache.clone(),
                    store: store.clone(),
                    inflight: inflight.clone(),
                    epoch: epoch.clone(),
                    notifier: notifier.clone(),
                    jobs: job_rx.clone(),
                };
                thread::spawn(move || worker.run())
            })
            .collect();

        Self {
            provider,
            cache,
            store,
            inflight,
            job_tx,
            job_rx,
            epoch,
            workers,
        }
    }

    /// Resolves a tile for `coord` without blocking on the network.
    ///
    /// Order of consultation: tile cache, in-flight table, on-disk store
    /// (synchronous decode), and finally the worker pool. The returned tile is
    /// pending unless one of the fast paths hit; the caller is notified via
    /// the redraw sink once a pending tile completes.
    pub fn request_tile(&self, coord: TileCoord) -> Arc<Tile> {
        let key = coord.key();

        if let Some(tile) = self.cache.get(key) {
            return tile;
        }
        if let Ok(inflight) = self.inflight.lock() {
            if let Some(tile) = inflight.get(&key) {
                return tile.clone();
            }
        }

        // Disk fast path, outside any lock.
        if let Some(bytes) = self.store.load(&self.provider.code, coord) {
            if let Ok(image) = image::load_from_memory(&bytes) {
                let tile = Arc::new(Tile::ready(coord, image));
                self.cache.put(tile.clone());
                return tile;
            }
            log::debug!("stale on-disk tile {:?}, refetching", coord);
        }

        let tile = Arc::new(Tile::pending(coord));
        let registered = match self.inflight.lock() {
            Ok(mut inflight) => {
                // Another caller may have registered while we read the disk.
                if let Some(existing) = inflight.get(&key) {
                    return existing.clone();
                }
                inflight.insert(key, tile.clone());
                true
            }
            Err(_) => false,
        };

        if registered {
            let job = Job::Fetch {
                tile: tile.clone(),
                epoch: self.epoch.load(Ordering::SeqCst),
            };
            if self.job_tx.send(job).is_err() {
                // Workers are gone; leave no dangling registration.
                if let Ok(mut inflight) = self.inflight.lock() {
                    inflight.remove(&key);
                }
            }
        }
        tile
    }

    /// Number of tiles currently registered as in flight.
    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Discards all queued work and forgets every in-flight registration.
    ///
    /// A fetch already dispatched to the network is not aborted; its eventual
    /// result is dropped because the epoch moved on and nothing references
    /// its registration anymore.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        while let Ok(job) = self.job_rx.try_recv() {
            // Re-queue shutdown requests that were behind the stale work.
            if matches!(job, Job::Shutdown) {
                let _ = self.job_tx.send(Job::Shutdown);
            }
        }
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.clear();
        }
    }

    /// Signals every worker to exit after its current unit of work and joins
    /// them. Cooperative, not preemptive.
    pub fn shutdown(&mut self) {
        for _ in &self.workers {
            let _ = self.job_tx.send(Job::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for TileFetchPipeline {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

/// One long-running fetch worker: blocks on the job queue, fetches, decodes,
/// persists and publishes tiles.
struct FetchWorker {
    provider: Arc<TileProvider>,
    cache: Arc<TileCache>,
    store: TileStore,
    inflight: Arc<Mutex<HashMap<u64, Arc<Tile>>>>,
    epoch: Arc<AtomicU64>,
    notifier: Arc<dyn RedrawNotifier>,
    jobs: Receiver<Job>,
}

impl FetchWorker {
    fn run(self) {
        while let Ok(job) = self.jobs.recv() {
            let (tile, job_epoch) = match job {
                Job::Shutdown => break,
                Job::Fetch { tile, epoch } => (tile, epoch),
            };

            // Work queued before a reset() is stale and must be dropped.
            if job_epoch != self.epoch.load(Ordering::SeqCst) {
                continue;
            }

            // The registration stays up until the fetch concludes so that a
            // concurrent request for the same key keeps getting this
            // placeholder instead of spawning a second fetch.
            match self.fetch(tile.coord) {
                Ok((bytes, image)) => {
                    self.store.save(&self.provider.code, tile.coord, &bytes);
                    tile.fulfill(image);
                    self.cache.put(tile.clone());
                }
                // Failed tiles leave no cache or in-flight entry, so the next
                // request for the same address retries.
                Err(e) => log::debug!("tile {:?} fetch failed: {}", tile.coord, e),
            }

            let completed = tile.is_ready();
            if let Ok(mut inflight) = self.inflight.lock() {
                inflight.remove(&tile.key());
            }
            if completed {
                self.notifier.request_redraw();
            }
        }
    }

    fn fetch(&self, coord: TileCoord) -> Result<(Vec<u8>, DynamicImage)> {
        let url = self.provider.url(coord);
        log::debug!("fetching tile {:?} from {}", coord, url);

        let response = HTTP_CLIENT.get(&url).send()?.error_for_status()?;
        let bytes = response.bytes()?.to_vec();
        let image = image::load_from_memory(&bytes)?;
        Ok((bytes, image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct NoopNotifier;
    impl RedrawNotifier for NoopNotifier {
        fn request_redraw(&self) {}
    }

    fn provider(url: &str) -> Arc<TileProvider> {
        Arc::new(
            TileProvider::from_line(&format!("Test,test,0,18,256,{url}/{{$z}}/{{$x}}/{{$y}}.png"))
                .unwrap(),
        )
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::new_rgba8(1, 1)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    /// Pipeline with no workers: jobs stay queued, so the pending-queue and
    /// in-flight bookkeeping can be observed deterministically.
    fn idle_pipeline(dir: &std::path::Path) -> TileFetchPipeline {
        TileFetchPipeline::with_config(
            provider("http://127.0.0.1:1"),
            Arc::new(TileCache::new(16)),
            TileStore::new(dir),
            Arc::new(NoopNotifier),
            PipelineConfig { workers: 0 },
        )
    }

    #[test]
    fn test_request_registers_single_pending_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = idle_pipeline(dir.path());
        let coord = TileCoord::new(1, 2, 3);

        let first = pipeline.request_tile(coord);
        let second = pipeline.request_tile(coord);

        assert!(!first.is_ready());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pipeline.inflight_len(), 1);
    }

    #[test]
    fn test_reset_forgets_pending_work() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = idle_pipeline(dir.path());
        let coord = TileCoord::new(4, 4, 4);

        let before = pipeline.request_tile(coord);
        pipeline.reset();
        assert_eq!(pipeline.inflight_len(), 0);

        // The old placeholder is detached; a new request starts over.
        let after = pipeline.request_tile(coord);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_disk_fast_path_returns_ready_tile() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::new(dir.path());
        let coord = TileCoord::new(7, 7, 7);
        store.save("test", coord, &png_bytes());

        let cache = Arc::new(TileCache::new(16));
        let pipeline = TileFetchPipeline::with_config(
            provider("http://127.0.0.1:1"),
            cache.clone(),
            store,
            Arc::new(NoopNotifier),
            PipelineConfig { workers: 0 },
        );

        let tile = pipeline.request_tile(coord);
        assert!(tile.is_ready());
        assert_eq!(pipeline.inflight_len(), 0);
        assert!(cache.contains(coord.key()));
    }

    #[test]
    fn test_corrupt_disk_tile_falls_through_to_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::new(dir.path());
        let coord = TileCoord::new(3, 1, 5);
        store.save("test", coord, b"not an image");

        let pipeline = TileFetchPipeline::with_config(
            provider("http://127.0.0.1:1"),
            Arc::new(TileCache::new(16)),
            store,
            Arc::new(NoopNotifier),
            PipelineConfig { workers: 0 },
        );

        let tile = pipeline.request_tile(coord);
        assert!(!tile.is_ready());
        assert_eq!(pipeline.inflight_len(), 1);
    }

    #[test]
    fn test_failed_fetch_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(TileCache::new(16));
        let mut pipeline = TileFetchPipeline::with_config(
            // Nothing listens here, so the fetch fails fast.
            provider("http://127.0.0.1:1"),
            cache.clone(),
            TileStore::new(dir.path()),
            Arc::new(NoopNotifier),
            PipelineConfig { workers: 2 },
        );

        let coord = TileCoord::new(0, 0, 1);
        let tile = pipeline.request_tile(coord);
        pipeline.shutdown();

        assert!(!tile.is_ready());
        assert!(!cache.contains(coord.key()));
        assert_eq!(pipeline.inflight_len(), 0);
    }
}
