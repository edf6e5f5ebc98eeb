//! The persistent index and its build, update and lookup operations.

use super::builder::{BuildOutput, BuilderConfig, IndexBuilder};
use super::types::{
    mime_type_for, ImageBlob, IndexData, IndexEntry, IndexMetadata, IndexOperation, IndexStats, MatchResult,
};
use crate::core::hasher::{ImageHasher, PerceptualHash};
use crate::core::scanner::{ImageFilter, LibraryScanner, ScanConfig, WalkDirScanner};
use crate::error::IndexError;
use crate::events::{Event, EventSender, IndexEvent, ScanEvent};
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Where the library lives and where the index is kept
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub library_dirs: Vec<PathBuf>,
    pub include_extensions: Vec<String>,
    pub index_path: PathBuf,
    pub builder: BuilderConfig,
}

/// Owns the in-memory index and its on-disk snapshot.
///
/// Readers get an `Arc` to an immutable [`IndexData`]; build and update
/// construct a complete replacement and swap it in, so a lookup never sees
/// a half-merged index.
pub struct IndexStore {
    settings: IndexSettings,
    hasher: Arc<dyn ImageHasher>,
    scanner: WalkDirScanner,
    current: RwLock<Option<Arc<IndexData>>>,
    load_error: RwLock<Option<String>>,
}

impl IndexStore {
    pub fn new(settings: IndexSettings, hasher: Arc<dyn ImageHasher>) -> Self {
        let filter = ImageFilter::with_extensions(&settings.include_extensions);
        let scanner = WalkDirScanner::new(ScanConfig::default(), filter);

        Self {
            settings,
            hasher,
            scanner,
            current: RwLock::new(None),
            load_error: RwLock::new(None),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.settings.index_path
    }

    pub fn hasher(&self) -> &dyn ImageHasher {
        self.hasher.as_ref()
    }

    /// Load the snapshot from disk.
    ///
    /// Returns `Ok(false)` when no index file exists yet. A file that fails
    /// to parse leaves the store unloaded; the reason is kept for
    /// [`IndexStore::load_error`].
    pub fn load(&self) -> Result<bool, IndexError> {
        let path = &self.settings.index_path;
        if !path.exists() {
            tracing::info!(path = %path.display(), "Index file not found");
            return Ok(false);
        }

        let bytes = fs::read(path).map_err(|source| IndexError::Read {
            path: path.clone(),
            source,
        })?;

        match serde_json::from_slice::<IndexData>(&bytes) {
            Ok(data) => {
                tracing::info!(path = %path.display(), count = data.len(), "Loaded index");
                self.replace(data);
                self.set_load_error(None);
                Ok(true)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "Failed to load index: {}", e);
                self.set_load_error(Some(e.to_string()));
                Err(IndexError::Corrupted {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Why the last load failed, if it did
    pub fn load_error(&self) -> Option<String> {
        self.load_error.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current index, if one is loaded
    pub fn snapshot(&self) -> Option<Arc<IndexData>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self) -> usize {
        self.snapshot().map_or(0, |data| data.len())
    }

    /// Discard the current index and hash the whole library again.
    pub fn build(&self, events: &EventSender) -> Result<Arc<IndexData>, IndexError> {
        events.send(Event::Index(IndexEvent::Started {
            operation: IndexOperation::Build.to_string(),
        }));

        let output = self.hash_library(events, |_| true);
        let now = Utc::now();
        let total = output.items.len();

        let meta = IndexMetadata {
            hash: Some(self.hasher.descriptor()),
            created_at: Some(now),
            updated_at: Some(now),
            operation: Some(IndexOperation::Build),
            library_dirs: self.library_dir_strings(),
            errors: output.errors,
            stats: Some(IndexStats {
                added: total,
                removed: 0,
                total,
            }),
        };

        let data = IndexData {
            meta,
            items: output.items,
        };
        self.commit(data, events)
    }

    /// Bring the index in line with the library without rehashing known files.
    ///
    /// Entries whose file is gone are dropped and only paths not already
    /// indexed are hashed. Falls back to [`IndexStore::build`] when nothing
    /// is loaded or the stored hashes came from a different hasher.
    pub fn update(&self, events: &EventSender) -> Result<Arc<IndexData>, IndexError> {
        let descriptor = self.hasher.descriptor();
        let current = match self.snapshot() {
            Some(data) if data.meta.hash.as_ref() == Some(&descriptor) => data,
            Some(_) => {
                tracing::info!("Hash parameters changed since the last build, rebuilding");
                return self.build(events);
            }
            None => {
                tracing::info!("No index loaded, running a full build");
                return self.build(events);
            }
        };

        events.send(Event::Index(IndexEvent::Started {
            operation: IndexOperation::Update.to_string(),
        }));

        let mut items = current.items.clone();
        let before = items.len();
        items.retain(|_, item| Path::new(&item.path).exists());
        let removed = before - items.len();
        if removed > 0 {
            tracing::info!(removed, "Pruned entries whose files are gone");
        }
        events.send(Event::Index(IndexEvent::Pruned { removed }));

        let known: HashSet<String> = items.values().map(|item| item.path.clone()).collect();
        let output = self.hash_library(events, |path| !known.contains(&*path.to_string_lossy()));
        let added = output.items.len();
        items.extend(output.items);

        let now = Utc::now();
        let meta = IndexMetadata {
            hash: Some(descriptor),
            created_at: current.meta.created_at.or(Some(now)),
            updated_at: Some(now),
            operation: Some(IndexOperation::Update),
            library_dirs: self.library_dir_strings(),
            errors: output.errors,
            stats: Some(IndexStats {
                added,
                removed,
                total: items.len(),
            }),
        };

        self.commit(IndexData { meta, items }, events)
    }

    /// Rank every entry by distance to `query`, closest first.
    ///
    /// A linear scan; ties keep index order.
    pub fn lookup_matches(&self, query: &PerceptualHash, top_k: usize) -> Result<Vec<MatchResult>, IndexError> {
        let data = self.snapshot().ok_or(IndexError::NotLoaded)?;

        let mut matches: Vec<MatchResult> = data
            .items
            .iter()
            .map(|(id, item)| MatchResult {
                id: id.clone(),
                path: item.path.clone(),
                distance: self.hasher.compute_distance(query, &item.hash),
            })
            .collect();

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);
        Ok(matches)
    }

    pub fn get_image_info(&self, image_id: &str) -> Option<IndexEntry> {
        self.snapshot()?.entry(image_id)
    }

    /// Read an indexed file from disk. Nothing is cached.
    pub fn get_image_blob(&self, image_id: &str) -> Option<ImageBlob> {
        let info = self.get_image_info(image_id)?;

        match fs::read(&info.path) {
            Ok(bytes) => Some(ImageBlob {
                bytes,
                mime_type: mime_type_for(&info.path),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %info.path, id = %image_id, "Image file not found");
                None
            }
            Err(e) => {
                tracing::error!(path = %info.path, "Failed to read image file: {}", e);
                None
            }
        }
    }

    fn hash_library<F>(&self, events: &EventSender, keep: F) -> BuildOutput
    where
        F: Fn(&Path) -> bool,
    {
        events.send(Event::Scan(ScanEvent::Started {
            roots: self.settings.library_dirs.clone(),
        }));

        let paths = self
            .scanner
            .discover(&self.settings.library_dirs)
            .filter(|path| keep(path));

        IndexBuilder::new(Arc::clone(&self.hasher), self.settings.builder.clone()).build(paths, events)
    }

    fn library_dir_strings(&self) -> Vec<String> {
        self.settings
            .library_dirs
            .iter()
            .map(|dir| dir.display().to_string())
            .collect()
    }

    /// Persist `data`, then make it the live index.
    fn commit(&self, data: IndexData, events: &EventSender) -> Result<Arc<IndexData>, IndexError> {
        self.save(&data)?;
        events.send(Event::Index(IndexEvent::Saved {
            path: self.settings.index_path.clone(),
            entries: data.len(),
        }));
        self.set_load_error(None);
        Ok(self.replace(data))
    }

    /// Write to a temporary file beside the index and rename it into place.
    fn save(&self, data: &IndexData) -> Result<(), IndexError> {
        let path = &self.settings.index_path;
        let write_error = |source: std::io::Error| IndexError::Write {
            path: path.clone(),
            source,
        };

        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_error)?;

        let temp = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, data).map_err(|e| IndexError::Serialize(e.to_string()))?;
            writer.flush().map_err(write_error)?;
        }
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(path).map_err(|e| write_error(e.error))?;

        tracing::info!(path = %path.display(), entries = data.len(), "Saved index");
        Ok(())
    }

    fn replace(&self, data: IndexData) -> Arc<IndexData> {
        let data = Arc::new(data);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&data));
        data
    }

    fn set_load_error(&self, error: Option<String>) {
        *self.load_error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::PHashHasher;
    use crate::core::index::types::{image_id, IndexItem};
    use crate::events::null_sender;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, seed: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(40, 40, |x, y| {
            let v = ((x * (seed + 2) * 13 + y * (seed + 5) * 7) % 256) as u8;
            Rgb([v, 255 - v, v / 3])
        })
        .save(&path)
        .unwrap();
        path
    }

    fn store_for(library: &Path, data_dir: &Path) -> IndexStore {
        let settings = IndexSettings {
            library_dirs: vec![library.to_path_buf()],
            include_extensions: vec![".png".to_string()],
            index_path: data_dir.join("index.json"),
            builder: BuilderConfig {
                workers: 1,
                ..Default::default()
            },
        };
        IndexStore::new(settings, Arc::new(PHashHasher::default()))
    }

    #[test]
    fn lookup_before_load_is_not_loaded() {
        let dir = TempDir::new().unwrap();
        let store = store_for(dir.path(), dir.path());
        let query = PerceptualHash::from_bytes(vec![0; 32]);

        assert!(matches!(store.lookup_matches(&query, 3), Err(IndexError::NotLoaded)));
    }

    #[test]
    fn build_persists_and_reloads() {
        let library = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_image(library.path(), "a.png", 1);
        write_image(library.path(), "b.png", 2);

        let store = store_for(library.path(), data.path());
        let built = store.build(&null_sender()).unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(built.meta.operation, Some(IndexOperation::Build));

        let reopened = store_for(library.path(), data.path());
        assert!(reopened.load().unwrap());
        assert_eq!(*reopened.snapshot().unwrap(), *built);
    }

    #[test]
    fn missing_index_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store_for(dir.path(), dir.path());

        assert!(!store.load().unwrap());
        assert!(!store.is_loaded());
    }

    #[test]
    fn lookup_orders_by_distance_and_truncates() {
        let dir = TempDir::new().unwrap();
        let store = store_for(dir.path(), dir.path());
        let mut data = IndexData::default();
        for (name, byte) in [("far", 0xFFu8), ("near", 0x01), ("exact", 0x00), ("mid", 0x0F)] {
            data.items.insert(
                image_id(name),
                IndexItem {
                    path: name.to_string(),
                    hash: PerceptualHash::from_bytes(vec![byte]),
                },
            );
        }
        store.replace(data);
        let query = PerceptualHash::from_bytes(vec![0x00]);

        let matches = store.lookup_matches(&query, 3).unwrap();
        let paths: Vec<&str> = matches.iter().map(|m| m.path.as_str()).collect();

        assert_eq!(paths, vec!["exact", "near", "mid"]);
        assert_eq!(matches[0].distance, 0.0);
        assert_eq!(matches[1].distance, 0.125);
    }

    #[test]
    fn blob_reads_file_and_guesses_mime() {
        let library = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let path = write_image(library.path(), "pic.png", 4);
        let store = store_for(library.path(), data.path());
        store.build(&null_sender()).unwrap();

        let id = image_id(&path.to_string_lossy());
        let blob = store.get_image_blob(&id).unwrap();
        assert_eq!(blob.mime_type, "image/png");
        assert_eq!(blob.bytes, fs::read(&path).unwrap());

        fs::remove_file(&path).unwrap();
        assert!(store.get_image_blob(&id).is_none());
        assert!(store.get_image_blob("unknown").is_none());
    }

    #[test]
    fn save_leaves_no_temporary_files() {
        let library = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_image(library.path(), "a.png", 3);

        store_for(library.path(), data.path()).build(&null_sender()).unwrap();

        let names: Vec<String> = fs::read_dir(data.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["index.json".to_string()]);
    }
}
