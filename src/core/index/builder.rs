//! Batch hashing of library files.
//!
//! Paths are grouped into fixed-size batches as they are discovered. In
//! parallel mode each batch is handed to a rayon pool as soon as it fills,
//! and finished batches report back over a crossbeam channel. Sequential
//! mode runs the very same [`process_batch`] inline, so both modes produce
//! identical entries for the same files.

use super::types::{image_id, IndexEntry, IndexItem};
use crate::core::hasher::ImageHasher;
use crate::core::imaging;
use crate::error::HashError;
use crate::events::{Event, EventSender, HashEvent, HashProgress, ScanEvent};
use crossbeam_channel::RecvTimeoutError;
use rayon::ThreadPoolBuilder;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Recorded once per batch that never reported back
pub const BATCH_TIMEOUT_ERROR: &str = "Batch timeout error";

const PROGRESS_LOG_INTERVAL: usize = 100;

/// Tuning for one builder run
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// 0 = auto, 1 = sequential, N = parallel capped at the host limit
    pub workers: usize,
    pub batch_size: usize,
    /// How long final collection waits for the next batch to report
    pub batch_timeout: Duration,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

/// Entries keyed by image id plus the per-file failures
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub items: BTreeMap<String, IndexItem>,
    pub errors: Vec<String>,
}

/// What one batch hands back
#[derive(Debug, Default)]
pub(crate) struct BatchResult {
    entries: Vec<IndexEntry>,
    /// `(path, message)` per failed file
    failures: Vec<(PathBuf, String)>,
}

impl BatchResult {
    fn processed(&self) -> usize {
        self.entries.len() + self.failures.len()
    }
}

/// Worker ceiling for this host: one core is left for the foreground.
pub fn max_workers() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    cpus.saturating_sub(1).max(1)
}

/// Map a requested worker count onto the host limit (0 = use the limit).
pub fn resolve_workers(requested: usize) -> usize {
    let limit = max_workers();
    if requested == 0 {
        limit
    } else {
        requested.min(limit)
    }
}

pub struct IndexBuilder {
    hasher: Arc<dyn ImageHasher>,
    config: BuilderConfig,
}

impl IndexBuilder {
    pub fn new(hasher: Arc<dyn ImageHasher>, config: BuilderConfig) -> Self {
        Self { hasher, config }
    }

    /// Hash every path the iterator yields.
    ///
    /// Never fails as a whole: unreadable files, panicking decoders and
    /// timed-out batches all end up in [`BuildOutput::errors`].
    pub fn build<I>(&self, paths: I, events: &EventSender) -> BuildOutput
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let paths = paths.into_iter();

        if self.config.workers == 1 {
            tracing::info!("Using sequential processing (build_workers=1)");
            return self.build_sequential(paths, events);
        }

        let workers = resolve_workers(self.config.workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("index-worker-{}", i))
            .panic_handler(|_| tracing::error!("Index worker panicked outside per-file isolation"))
            .build();

        match pool {
            Ok(pool) => {
                tracing::info!(
                    "Building index with {} workers (max available: {})",
                    workers,
                    max_workers()
                );
                self.build_parallel(&pool, workers, paths, events)
            }
            Err(e) => {
                tracing::warn!("Parallel processing failed ({}), falling back to sequential", e);
                self.build_sequential(paths, events)
            }
        }
    }

    fn build_sequential(&self, paths: impl Iterator<Item = PathBuf>, events: &EventSender) -> BuildOutput {
        events.send(Event::Hash(HashEvent::Started { workers: 1 }));
        let mut collector = Collector::new(events);

        for batch in batches(paths, self.config.batch_size) {
            collector.discovered += batch.len();
            let result = process_batch(self.hasher.as_ref(), &batch);
            collector.absorb(result);
        }

        events.send(Event::Scan(ScanEvent::Completed {
            total_files: collector.discovered,
        }));
        collector.finish()
    }

    fn build_parallel(
        &self,
        pool: &rayon::ThreadPool,
        workers: usize,
        paths: impl Iterator<Item = PathBuf>,
        events: &EventSender,
    ) -> BuildOutput {
        events.send(Event::Hash(HashEvent::Started { workers }));
        let (tx, rx) = crossbeam_channel::unbounded::<BatchResult>();
        let mut collector = Collector::new(events);
        let mut submitted = 0usize;
        let mut received = 0usize;

        // Submit batches as discovery yields them, draining finished ones in between.
        for batch in batches(paths, self.config.batch_size) {
            collector.discovered += batch.len();
            let tx = tx.clone();
            let hasher = Arc::clone(&self.hasher);
            pool.spawn(move || {
                let result = process_batch(hasher.as_ref(), &batch);
                let _ = tx.send(result);
            });
            submitted += 1;

            while let Ok(result) = rx.try_recv() {
                collector.absorb(result);
                received += 1;
            }
        }
        drop(tx);

        events.send(Event::Scan(ScanEvent::Completed {
            total_files: collector.discovered,
        }));

        while received < submitted {
            match rx.recv_timeout(self.config.batch_timeout) {
                Ok(result) => {
                    collector.absorb(result);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let outstanding = submitted - received;
                    tracing::error!("Batch processing timed out ({} batches outstanding)", outstanding);
                    collector
                        .errors
                        .extend(std::iter::repeat(BATCH_TIMEOUT_ERROR.to_string()).take(outstanding));
                    events.send(Event::Hash(HashEvent::BatchTimedOut { batches: outstanding }));
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let outstanding = submitted - received;
                    tracing::error!("{} batches exited without reporting", outstanding);
                    collector.errors.extend(
                        std::iter::repeat("Worker error: batch exited without reporting".to_string())
                            .take(outstanding),
                    );
                    break;
                }
            }
        }

        collector.finish()
    }
}

/// Accumulates batch results in whatever order they arrive.
struct Collector<'a> {
    events: &'a EventSender,
    items: BTreeMap<String, IndexItem>,
    errors: Vec<String>,
    processed: usize,
    discovered: usize,
    last_logged: usize,
}

impl<'a> Collector<'a> {
    fn new(events: &'a EventSender) -> Self {
        Self {
            events,
            items: BTreeMap::new(),
            errors: Vec::new(),
            processed: 0,
            discovered: 0,
            last_logged: 0,
        }
    }

    fn absorb(&mut self, result: BatchResult) {
        self.processed += result.processed();

        for (path, message) in result.failures {
            tracing::warn!(path = %path.display(), "Failed to process image: {}", message);
            self.errors.push(format!("{}: {}", path.display(), message));
            self.events.send(Event::Hash(HashEvent::Error { path, message }));
        }
        for entry in result.entries {
            let (id, item) = entry.into_item();
            self.items.insert(id, item);
        }

        if self.processed / PROGRESS_LOG_INTERVAL > self.last_logged {
            self.last_logged = self.processed / PROGRESS_LOG_INTERVAL;
            tracing::info!("Processed {} files...", self.processed);
        }
        self.events.send(Event::Hash(HashEvent::Progress(HashProgress {
            completed: self.processed,
            discovered: self.discovered,
        })));
    }

    fn finish(self) -> BuildOutput {
        tracing::info!(
            "Index building complete: {} files indexed, {} errors",
            self.items.len(),
            self.errors.len()
        );
        self.events.send(Event::Hash(HashEvent::Completed {
            total_hashed: self.items.len(),
            errors: self.errors.len(),
        }));
        BuildOutput {
            items: self.items,
            errors: self.errors,
        }
    }
}

/// Group an iterator into vectors of `size` (the last may be shorter).
fn batches<I>(paths: I, size: usize) -> impl Iterator<Item = Vec<PathBuf>>
where
    I: Iterator<Item = PathBuf>,
{
    let size = size.max(1);
    let mut paths = paths;
    std::iter::from_fn(move || {
        let batch: Vec<PathBuf> = paths.by_ref().take(size).collect();
        (!batch.is_empty()).then_some(batch)
    })
}

/// Load and hash every file in `batch`, isolating failures per file.
pub(crate) fn process_batch(hasher: &dyn ImageHasher, batch: &[PathBuf]) -> BatchResult {
    let mut result = BatchResult::default();

    for path in batch {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| hash_file(hasher, path)));
        match outcome {
            Ok(Ok(entry)) => result.entries.push(entry),
            Ok(Err(e)) => result.failures.push((path.clone(), e.to_string())),
            Err(_) => result
                .failures
                .push((path.clone(), "decoder panicked while reading image".to_string())),
        }
    }

    result
}

fn hash_file(hasher: &dyn ImageHasher, path: &Path) -> Result<IndexEntry, HashError> {
    let image = imaging::load_path(path)?;
    let hash = hasher.create_hash(&image, None)?;
    let path = path.to_string_lossy().into_owned();

    Ok(IndexEntry {
        image_id: image_id(&path),
        path,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::PHashHasher;
    use crate::events::null_sender;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, seed: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(48, 32, |x, y| {
            let v = ((x * (seed + 3) + y * (seed * 7 + 1)) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        })
        .save(&path)
        .unwrap();
        path
    }

    /// Hashes normally, but only after `delay`.
    struct SlowHasher {
        inner: PHashHasher,
        delay: Duration,
    }

    impl ImageHasher for SlowHasher {
        fn create_hash(
            &self,
            image: &image::DynamicImage,
            region: Option<crate::core::detector::BoundingBox>,
        ) -> Result<crate::core::hasher::PerceptualHash, HashError> {
            std::thread::sleep(self.delay);
            self.inner.create_hash(image, region)
        }

        fn descriptor(&self) -> crate::core::hasher::HashDescriptor {
            self.inner.descriptor()
        }
    }

    fn builder(workers: usize, batch_size: usize) -> IndexBuilder {
        IndexBuilder::new(
            Arc::new(PHashHasher::default()),
            BuilderConfig {
                workers,
                batch_size,
                ..Default::default()
            },
        )
    }

    #[test]
    fn resolve_workers_caps_at_host_limit() {
        assert_eq!(resolve_workers(0), max_workers());
        assert_eq!(resolve_workers(10_000), max_workers());
        assert_eq!(resolve_workers(1), 1);
    }

    #[test]
    fn batches_split_evenly_with_remainder() {
        let paths = (0..5).map(|i| PathBuf::from(format!("{}.jpg", i)));
        let sizes: Vec<usize> = batches(paths, 2).map(|b| b.len()).collect();

        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn bad_file_does_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        let good = write_image(dir.path(), "good.png", 1);
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"not really a jpeg").unwrap();
        let missing = dir.path().join("missing.png");

        let result = process_batch(&PHashHasher::default(), &[bad.clone(), good.clone(), missing]);

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].path, good.to_string_lossy());
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].0, bad);
    }

    #[test]
    fn errors_are_formatted_with_path() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("broken.png");
        std::fs::write(&bad, b"garbage").unwrap();

        let output = builder(1, 20).build(vec![bad.clone()], &null_sender());

        assert!(output.items.is_empty());
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].starts_with(&format!("{}: ", bad.display())));
    }

    #[test]
    fn parallel_matches_sequential() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..7)
            .map(|i| write_image(dir.path(), &format!("img{}.png", i), i))
            .collect();

        let sequential = builder(1, 3).build(paths.clone(), &null_sender());
        let parallel = builder(0, 3).build(paths, &null_sender());

        assert_eq!(sequential.items.len(), 7);
        assert_eq!(sequential.items, parallel.items);
    }

    #[test]
    fn progress_events_are_monotonic() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| write_image(dir.path(), &format!("p{}.png", i), i))
            .collect();
        let (sender, receiver) = crate::events::EventChannel::new();

        builder(2, 2).build(paths, &sender);
        drop(sender);

        let mut last = 0;
        let mut total_files = None;
        for event in receiver.iter() {
            match event {
                Event::Hash(HashEvent::Progress(p)) => {
                    assert!(p.completed >= last);
                    last = p.completed;
                }
                Event::Scan(ScanEvent::Completed { total_files: n }) => total_files = Some(n),
                _ => {}
            }
        }
        assert_eq!(last, 5);
        assert_eq!(total_files, Some(5));
    }

    #[test]
    fn stalled_batches_are_recorded_as_timeouts() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| write_image(dir.path(), &format!("s{}.png", i), i))
            .collect();
        let slow = IndexBuilder::new(
            Arc::new(SlowHasher {
                inner: PHashHasher::default(),
                delay: Duration::from_secs(1),
            }),
            BuilderConfig {
                workers: 2,
                batch_size: 1,
                batch_timeout: Duration::from_millis(20),
            },
        );
        let (sender, receiver) = crate::events::EventChannel::new();

        let output = slow.build(paths, &sender);
        drop(sender);

        assert!(output.items.is_empty());
        assert_eq!(output.errors.len(), 4);
        assert!(output.errors.iter().all(|e| e == BATCH_TIMEOUT_ERROR));

        let timed_out: Vec<usize> = receiver
            .iter()
            .filter_map(|event| match event {
                Event::Hash(HashEvent::BatchTimedOut { batches }) => Some(batches),
                _ => None,
            })
            .collect();
        assert_eq!(timed_out, vec![4]);
    }
}
