//! Records stored in and returned from the index.

use crate::core::hasher::{HashDescriptor, PerceptualHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::xxh3_128;

/// Stable identifier for a library file, derived from its path alone.
///
/// The same path string always maps to the same id, so re-indexing a file
/// replaces its entry instead of duplicating it.
pub fn image_id(path: &str) -> String {
    format!("{:032x}", xxh3_128(path.as_bytes()))
}

/// One indexed file as stored under its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexItem {
    pub path: String,
    pub hash: PerceptualHash,
}

/// An indexed file together with its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub image_id: String,
    pub path: String,
    pub hash: PerceptualHash,
}

impl IndexEntry {
    pub fn into_item(self) -> (String, IndexItem) {
        (
            self.image_id,
            IndexItem {
                path: self.path,
                hash: self.hash,
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOperation {
    Build,
    Update,
}

impl IndexOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexOperation::Build => "build",
            IndexOperation::Update => "update",
        }
    }
}

impl std::fmt::Display for IndexOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub added: usize,
    pub removed: usize,
    pub total: usize,
}

/// Descriptive metadata about the last build or update.
///
/// Every field is optional on disk so older or hand-edited index files
/// still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexMetadata {
    /// Hasher that produced the stored hashes
    pub hash: Option<HashDescriptor>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub operation: Option<IndexOperation>,
    pub library_dirs: Vec<String>,
    /// Per-file failures from the last run, as `"path: message"`
    pub errors: Vec<String>,
    pub stats: Option<IndexStats>,
}

/// The complete persisted index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexData {
    pub meta: IndexMetadata,
    pub items: BTreeMap<String, IndexItem>,
}

impl IndexData {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn entry(&self, image_id: &str) -> Option<IndexEntry> {
        self.items.get(image_id).map(|item| IndexEntry {
            image_id: image_id.to_string(),
            path: item.path.clone(),
            hash: item.hash.clone(),
        })
    }
}

/// One lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: String,
    pub path: String,
    pub distance: f64,
}

/// Raw bytes of a library file plus its guessed MIME type
#[derive(Debug, Clone)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Guess a MIME type from the file extension.
pub fn mime_type_for(path: &str) -> &'static str {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("tif" | "tiff") => "image/tiff",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
