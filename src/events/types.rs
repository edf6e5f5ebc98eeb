//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted while building or updating the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Library discovery events
    Scan(ScanEvent),
    /// Hashing phase events
    Hash(HashEvent),
    /// Index-level events
    Index(IndexEvent),
}

/// Events during library discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Discovery has started
    Started { roots: Vec<PathBuf> },
    /// Discovery finished; the total number of files to hash is now known
    Completed { total_files: usize },
}

/// Events during the hashing phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HashEvent {
    /// Hashing has started with the given worker count (1 = sequential)
    Started { workers: usize },
    /// Progress update; `completed` never decreases within one build
    Progress(HashProgress),
    /// A file failed to load or hash; hashing continues
    Error { path: PathBuf, message: String },
    /// Batches that did not report back before the timeout
    BatchTimedOut { batches: usize },
    /// Hashing completed
    Completed { total_hashed: usize, errors: usize },
}

/// Progress information during hashing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashProgress {
    /// Files processed so far (hashed or failed)
    pub completed: usize,
    /// Files discovered so far
    pub discovered: usize,
}

/// Index-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexEvent {
    /// A build or update has started
    Started { operation: String },
    /// Entries dropped because their backing file is gone
    Pruned { removed: usize },
    /// The snapshot was written to disk
    Saved { path: PathBuf, entries: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Hash(HashEvent::Progress(HashProgress {
            completed: 40,
            discovered: 60,
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Hash(HashEvent::Progress(p)) => {
                assert_eq!(p.completed, 40);
                assert_eq!(p.discovered, 60);
            }
            _ => panic!("Wrong event type"),
        }
    }
}
