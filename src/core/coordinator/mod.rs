//! # Coordinator Module
//!
//! Runs index builds and updates in the background, one at a time.
//!
//! A single [`BuildTask`] record describes the running or most recently
//! finished operation. Starting a build while one is running fails at once
//! with [`BuildError::AlreadyRunning`]; nothing is queued. Status reads take
//! the same lock as the background writer, so a poll never observes a
//! half-applied update.
//!
//! ## Threads
//! - `index-build` runs the store operation (a new thread per build)
//! - `index-build-progress` folds builder events into the task record
//!
//! The builder's own hashing pool is separate and never touches this lock.

use crate::core::index::{IndexMetadata, IndexOperation, IndexStore};
use crate::error::BuildError;
use crate::events::{Event, EventChannel, EventReceiver, HashEvent, IndexEvent, ScanEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Running,
    Completed,
    Failed,
}

/// Snapshot of one build or update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTask {
    pub operation: IndexOperation,
    pub status: BuildStatus,
    /// Files processed so far
    pub progress: usize,
    /// Known once discovery finishes
    pub total: Option<usize>,
    /// Files that failed to hash plus batches that timed out
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Metadata of the index the operation produced
    pub result: Option<IndexMetadata>,
}

impl BuildTask {
    fn running(operation: IndexOperation) -> Self {
        Self {
            operation,
            status: BuildStatus::Running,
            progress: 0,
            total: None,
            errors: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            result: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == BuildStatus::Running
    }
}

/// The task record plus a condition variable signalled when it turns terminal.
#[derive(Default)]
struct TaskSlot {
    task: Mutex<Option<BuildTask>>,
    finished: Condvar,
}

impl TaskSlot {
    fn lock(&self) -> MutexGuard<'_, Option<BuildTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut BuildTask)) {
        if let Some(task) = self.lock().as_mut() {
            apply(task);
        }
    }

    fn finish(&self, apply: impl FnOnce(&mut BuildTask)) {
        self.update(|task| {
            apply(task);
            task.completed_at = Some(Utc::now());
        });
        self.finished.notify_all();
    }
}

pub struct BuildCoordinator {
    store: Arc<IndexStore>,
    slot: Arc<TaskSlot>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BuildCoordinator {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self {
            store,
            slot: Arc::new(TaskSlot::default()),
            worker: Mutex::new(None),
        }
    }

    /// Start a full rebuild (`rebuild = true`) or an incremental update.
    ///
    /// Returns the initial task snapshot without waiting for any work.
    pub fn start_build(&self, rebuild: bool) -> Result<BuildTask, BuildError> {
        let operation = if rebuild {
            IndexOperation::Build
        } else {
            IndexOperation::Update
        };

        let mut slot = self.slot.lock();
        if let Some(task) = slot.as_ref().filter(|task| task.is_running()) {
            return Err(BuildError::AlreadyRunning {
                operation: task.operation.to_string(),
                started_at: task.started_at.to_rfc3339(),
            });
        }

        let task = BuildTask::running(operation);
        *slot = Some(task.clone());

        let store = Arc::clone(&self.store);
        let task_slot = Arc::clone(&self.slot);
        let spawned = thread::Builder::new()
            .name("index-build".to_string())
            .spawn(move || run_build(&store, &task_slot, operation));

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(task)
            }
            Err(e) => {
                tracing::error!("Failed to start background build: {}", e);
                if let Some(task) = slot.as_mut() {
                    task.status = BuildStatus::Failed;
                    task.completed_at = Some(Utc::now());
                    task.error = Some(e.to_string());
                }
                Err(BuildError::SpawnFailed(e.to_string()))
            }
        }
    }

    /// Current task snapshot, if any build has been started
    pub fn get_status(&self) -> Option<BuildTask> {
        self.slot.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(BuildTask::is_running)
    }

    /// Block until the running task (if any) turns terminal or `timeout`
    /// elapses. Returns whether nothing is left running.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let slot = self.slot.lock();
        let (slot, _) = self
            .slot
            .finished
            .wait_timeout_while(slot, timeout, |task| task.as_ref().is_some_and(BuildTask::is_running))
            .unwrap_or_else(PoisonError::into_inner);
        let done = !slot.as_ref().is_some_and(BuildTask::is_running);
        drop(slot);

        if done {
            // The task is terminal; the thread only has to return.
            if let Some(handle) = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = handle.join();
            }
        }
        done
    }
}

fn run_build(store: &IndexStore, slot: &Arc<TaskSlot>, operation: IndexOperation) {
    tracing::info!("Background build started: {}", operation);

    let (sender, receiver) = EventChannel::new();
    let progress_slot = Arc::clone(slot);
    let forwarder = thread::Builder::new()
        .name("index-build-progress".to_string())
        .spawn(move || forward_progress(receiver, &progress_slot))
        .map_err(|e| tracing::warn!("Build progress will not be reported: {}", e))
        .ok();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match operation {
        IndexOperation::Build => store.build(&sender),
        IndexOperation::Update => store.update(&sender),
    }));

    // Every progress event is applied before the task turns terminal.
    drop(sender);
    if let Some(handle) = forwarder {
        let _ = handle.join();
    }

    match outcome {
        Ok(Ok(data)) => {
            let count = data.len();
            tracing::info!("Background build completed: {} images", count);
            slot.finish(|task| {
                task.status = BuildStatus::Completed;
                task.total = Some(task.total.map_or(count, |total| total.max(count)));
                task.progress = task.progress.max(count);
                task.result = Some(data.meta.clone());
            });
        }
        Ok(Err(e)) => {
            tracing::error!("Background build failed: {}", e);
            slot.finish(|task| {
                task.status = BuildStatus::Failed;
                task.error = Some(e.to_string());
            });
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!("Background build panicked: {}", message);
            slot.finish(|task| {
                task.status = BuildStatus::Failed;
                task.error = Some(format!("build panicked: {}", message));
            });
        }
    }
}

fn forward_progress(receiver: EventReceiver, slot: &TaskSlot) {
    for event in receiver.iter() {
        match event {
            Event::Scan(ScanEvent::Started { roots }) => {
                tracing::debug!("Scanning {} library roots", roots.len());
            }
            Event::Scan(ScanEvent::Completed { total_files }) => slot.update(|task| {
                task.total = Some(total_files);
            }),
            Event::Hash(HashEvent::Started { workers }) => {
                tracing::debug!("Hashing with {} workers", workers);
            }
            Event::Hash(HashEvent::Progress(progress)) => slot.update(|task| {
                task.progress = task.progress.max(progress.completed);
            }),
            Event::Hash(HashEvent::Error { .. }) => slot.update(|task| task.errors += 1),
            Event::Hash(HashEvent::BatchTimedOut { batches }) => slot.update(|task| task.errors += batches),
            Event::Hash(HashEvent::Completed { total_hashed, errors }) => {
                tracing::debug!("Hashed {} files with {} errors", total_hashed, errors);
            }
            Event::Index(IndexEvent::Started { operation }) => {
                tracing::debug!("Index {} started", operation);
            }
            Event::Index(IndexEvent::Pruned { removed }) => {
                tracing::debug!("Pruned {} entries for missing files", removed);
            }
            Event::Index(IndexEvent::Saved { path, entries }) => {
                tracing::debug!(path = %path.display(), "Saved {} entries", entries);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::PHashHasher;
    use crate::core::index::{BuilderConfig, IndexSettings};
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    fn coordinator(library: &Path, index_path: &Path) -> BuildCoordinator {
        let settings = IndexSettings {
            library_dirs: vec![library.to_path_buf()],
            include_extensions: vec![".png".to_string()],
            index_path: index_path.to_path_buf(),
            builder: BuilderConfig::default(),
        };
        BuildCoordinator::new(Arc::new(IndexStore::new(settings, Arc::new(PHashHasher::default()))))
    }

    fn write_images(dir: &Path, count: u32) {
        for i in 0..count {
            RgbImage::from_fn(32, 32, |x, y| Rgb([(x * i) as u8, (y * 3) as u8, i as u8]))
                .save(dir.join(format!("img{}.png", i)))
                .unwrap();
        }
    }

    #[test]
    fn no_status_before_first_build() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), &dir.path().join("index.json"));

        assert!(coordinator.get_status().is_none());
        assert!(coordinator.wait_for_completion(Duration::from_millis(10)));
    }

    #[test]
    fn running_task_rejects_second_start() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path(), &dir.path().join("index.json"));
        *coordinator.slot.lock() = Some(BuildTask::running(IndexOperation::Update));

        let err = coordinator.start_build(true).unwrap_err();

        assert!(matches!(err, BuildError::AlreadyRunning { ref operation, .. } if operation == "update"));
        assert!(!coordinator.wait_for_completion(Duration::from_millis(20)));
    }

    #[test]
    fn completed_build_reports_counts_and_metadata() {
        let library = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_images(library.path(), 4);
        let coordinator = coordinator(library.path(), &data.path().join("index.json"));

        let started = coordinator.start_build(true).unwrap();
        assert_eq!(started.status, BuildStatus::Running);
        assert!(coordinator.wait_for_completion(Duration::from_secs(60)));

        let task = coordinator.get_status().unwrap();
        assert_eq!(task.status, BuildStatus::Completed);
        assert_eq!(task.progress, 4);
        assert_eq!(task.total, Some(4));
        assert_eq!(task.errors, 0);
        assert!(task.completed_at.is_some());
        assert_eq!(task.result.unwrap().operation, Some(IndexOperation::Build));

        // Terminal tasks do not block the next start.
        coordinator.start_build(false).unwrap();
        assert!(coordinator.wait_for_completion(Duration::from_secs(60)));
    }

    #[test]
    fn unreadable_files_count_toward_progress_and_errors() {
        let library = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_images(library.path(), 3);
        std::fs::write(library.path().join("broken.png"), b"not a png").unwrap();
        let coordinator = coordinator(library.path(), &data.path().join("index.json"));

        coordinator.start_build(true).unwrap();
        assert!(coordinator.wait_for_completion(Duration::from_secs(60)));

        let task = coordinator.get_status().unwrap();
        assert_eq!(task.status, BuildStatus::Completed);
        assert_eq!(task.progress, 4);
        assert_eq!(task.total, Some(4));
        assert_eq!(task.errors, 1);
        assert_eq!(task.result.unwrap().errors.len(), 1);
    }

    #[test]
    fn failed_build_records_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let coordinator = coordinator(dir.path(), &blocker.join("index.json"));

        coordinator.start_build(true).unwrap();
        assert!(coordinator.wait_for_completion(Duration::from_secs(60)));

        let task = coordinator.get_status().unwrap();
        assert_eq!(task.status, BuildStatus::Failed);
        assert!(task.error.is_some());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(BuildTask::running(IndexOperation::Build)).unwrap();

        assert_eq!(json["status"], "running");
        assert_eq!(json["operation"], "build");
        assert!(json["total"].is_null());
    }
}
