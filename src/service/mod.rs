//! # Service Module
//!
//! [`PhotoLookup`] is the surface a front end (CLI, HTTP) calls. It wires
//! the configuration, index store, build coordinator, detector and hasher
//! together and shapes their results into serializable responses.

use crate::config::{AppConfig, MAX_TOP_K};
use crate::core::coordinator::{BuildCoordinator, BuildTask};
use crate::core::detector::{detect_main_region, BoundingBox};
use crate::core::hasher::{HashDescriptor, ImageHasher, PHashHasher};
use crate::core::imaging;
use crate::core::index::{ImageBlob, IndexEntry, IndexMetadata, IndexStore, MatchResult};
use crate::error::{IndexError, PhotoLookupError, Result};
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEBUG_JPEG_QUALITY: u8 = 90;

/// Index presence plus the latest build task
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub exists: bool,
    pub index_path: PathBuf,
    /// Entry count; absent while no index is loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub meta: Option<IndexMetadata>,
    pub build_status: Option<BuildTask>,
    /// Set when an index file exists but could not be parsed
    pub load_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResponse {
    pub query_hash: String,
    pub matches: Vec<MatchResult>,
    /// Entries in the index, not the number of matches returned
    pub count: usize,
    pub index_meta: IndexMetadata,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BBoxResponse {
    pub bbox: BoundingBox,
}

/// Files written by a debug capture
#[derive(Debug, Clone, Serialize)]
pub struct DebugCapture {
    pub id: String,
    pub image: PathBuf,
    pub meta: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CaptureMeta {
    bbox: Option<BoundingBox>,
    detected_bbox: Option<BoundingBox>,
}

/// Effective configuration as reported to clients
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub version: &'static str,
    pub image_library_dirs: Vec<PathBuf>,
    pub index_path: PathBuf,
    pub top_k_default: usize,
    pub include_extensions: Vec<String>,
    pub hash_meta: HashDescriptor,
    pub debug_dir: PathBuf,
}

pub struct PhotoLookup {
    config: AppConfig,
    store: Arc<IndexStore>,
    coordinator: BuildCoordinator,
}

impl PhotoLookup {
    /// Set up the service and load the existing index, if any.
    ///
    /// A corrupt index is logged and left unloaded; see
    /// [`IndexStatus::load_error`].
    pub fn open(config: AppConfig) -> Self {
        let hasher: Arc<dyn ImageHasher> = Arc::new(PHashHasher::default());
        let store = Arc::new(IndexStore::new(config.index_settings(), hasher));

        tracing::info!("Loading index on startup...");
        match store.load() {
            Ok(true) => tracing::info!("Index loaded successfully: {} images", store.count()),
            Ok(false) => tracing::warn!("No index found. Build index to enable lookups."),
            Err(e) => tracing::error!("Index unavailable: {}", e),
        }

        let coordinator = BuildCoordinator::new(Arc::clone(&store));
        Self {
            config,
            store,
            coordinator,
        }
    }

    pub fn config_summary(&self) -> ConfigSummary {
        ConfigSummary {
            version: env!("CARGO_PKG_VERSION"),
            image_library_dirs: self.config.image_library_dirs.clone(),
            index_path: self.config.index_path.clone(),
            top_k_default: self.config.top_k_default,
            include_extensions: self.config.include_extensions.clone(),
            hash_meta: self.store.hasher().descriptor(),
            debug_dir: self.config.debug_dir.clone(),
        }
    }

    pub fn status(&self) -> IndexStatus {
        let snapshot = self.store.snapshot();
        IndexStatus {
            exists: snapshot.is_some(),
            index_path: self.config.index_path.clone(),
            count: snapshot.as_ref().map(|data| data.len()),
            meta: snapshot.map(|data| data.meta.clone()),
            build_status: self.coordinator.get_status(),
            load_error: self.store.load_error(),
        }
    }

    /// Start a background rebuild or update. Fails if one is already running.
    pub fn start_build(&self, rebuild: bool) -> Result<BuildTask> {
        Ok(self.coordinator.start_build(rebuild)?)
    }

    pub fn build_status(&self) -> Option<BuildTask> {
        self.coordinator.get_status()
    }

    /// Find the library images closest to an uploaded image.
    ///
    /// `top_k` defaults to the configured value; `bbox` restricts hashing to
    /// `"x0,y0,x1,y1"` of the upload.
    pub fn lookup(&self, bytes: &[u8], top_k: Option<usize>, bbox: Option<&str>) -> Result<LookupResponse> {
        let top_k = self.resolve_top_k(top_k)?;
        let region = parse_bbox(bbox)?;
        let data = self.store.snapshot().ok_or(IndexError::NotLoaded)?;

        let image = imaging::load_bytes(bytes)?;
        let query = self.store.hasher().create_hash(&image, region)?;
        let matches = self.store.lookup_matches(&query, top_k)?;

        Ok(LookupResponse {
            query_hash: query.to_hex(),
            matches,
            count: data.len(),
            index_meta: data.meta.clone(),
        })
    }

    pub fn detect_bbox(&self, bytes: &[u8]) -> Result<BBoxResponse> {
        let image = imaging::load_bytes(bytes)?;
        Ok(BBoxResponse {
            bbox: detect_main_region(&image),
        })
    }

    pub fn image_info(&self, image_id: &str) -> Option<IndexEntry> {
        self.store.get_image_info(image_id)
    }

    /// Bytes of an indexed file; `None` for unknown ids or vanished files
    pub fn image_blob(&self, image_id: &str) -> Option<ImageBlob> {
        self.store.get_image_blob(image_id)
    }

    /// Save an upload (orientation-corrected, as JPEG) and the boxes that
    /// went with it into the debug directory.
    pub fn save_debug_capture(
        &self,
        bytes: &[u8],
        detected_bbox: Option<&str>,
        bbox: Option<&str>,
    ) -> Result<DebugCapture> {
        let meta = CaptureMeta {
            bbox: parse_bbox(bbox)?,
            detected_bbox: parse_bbox(detected_bbox)?,
        };
        let image = imaging::load_bytes(bytes)?;

        let dir = &self.config.debug_dir;
        fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;

        let id = Uuid::new_v4().simple().to_string();
        let image_path = dir.join(format!("{}.jpg", id));
        let meta_path = dir.join(format!("{}.json", id));

        let file = File::create(&image_path).map_err(|source| io_error(&image_path, source))?;
        let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), DEBUG_JPEG_QUALITY);
        image
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(|e| io_error(&image_path, std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| io_error(&meta_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        fs::write(&meta_path, json).map_err(|source| io_error(&meta_path, source))?;

        tracing::info!(id = %id, "Saved debug capture");
        Ok(DebugCapture {
            id,
            image: image_path,
            meta: meta_path,
        })
    }

    /// Wait up to `timeout` for a running build, then report whether it finished.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        tracing::info!("Shutting down...");
        let finished = self.coordinator.wait_for_completion(timeout);
        if finished {
            tracing::info!("Build completed before shutdown");
        } else {
            tracing::warn!("Build did not complete within timeout, shutting down anyway");
        }
        finished
    }

    fn resolve_top_k(&self, top_k: Option<usize>) -> Result<usize> {
        let top_k = top_k.unwrap_or(self.config.top_k_default);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(PhotoLookupError::InvalidRequest(format!(
                "top_k must be between 1 and {}, got {}",
                MAX_TOP_K, top_k
            )));
        }
        Ok(top_k)
    }
}

/// Parse an optional `"x0,y0,x1,y1"` region. Blank input means none.
pub fn parse_bbox(bbox: Option<&str>) -> Result<Option<BoundingBox>> {
    match bbox.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(text) => text
            .parse::<BoundingBox>()
            .map(Some)
            .map_err(|e| PhotoLookupError::InvalidRequest(format!("Invalid bbox: {}", e))),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PhotoLookupError {
    PhotoLookupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HashError;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 5) as u8, (y * 9) as u8, 77]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn service(data_dir: &Path) -> PhotoLookup {
        PhotoLookup::open(AppConfig::from_data_dir(data_dir).unwrap())
    }

    #[test]
    fn parse_bbox_handles_blank_and_invalid() {
        assert_eq!(parse_bbox(None).unwrap(), None);
        assert_eq!(parse_bbox(Some("  ")).unwrap(), None);
        assert_eq!(parse_bbox(Some("1,2,3,4")).unwrap(), Some(BoundingBox::new(1, 2, 3, 4)));
        assert!(matches!(parse_bbox(Some("1,2")), Err(PhotoLookupError::InvalidRequest(_))));
    }

    #[test]
    fn lookup_without_index_is_not_loaded() {
        let dir = TempDir::new().unwrap();
        let result = service(dir.path()).lookup(&png_bytes(20, 20), None, None);

        assert!(matches!(result, Err(PhotoLookupError::Index(IndexError::NotLoaded))));
    }

    #[test]
    fn lookup_rejects_out_of_range_top_k() {
        let dir = TempDir::new().unwrap();
        let lookup = service(dir.path());

        for top_k in [0, 101] {
            let result = lookup.lookup(&png_bytes(20, 20), Some(top_k), None);
            assert!(matches!(result, Err(PhotoLookupError::InvalidRequest(_))));
        }
    }

    #[test]
    fn status_reports_missing_index() {
        let dir = TempDir::new().unwrap();
        let status = service(dir.path()).status();

        assert!(!status.exists);
        assert_eq!(status.count, None);
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("count").is_none());
        assert!(status.build_status.is_none());
        assert!(status.load_error.is_none());
    }

    #[test]
    fn detect_bbox_stays_in_bounds() {
        let dir = TempDir::new().unwrap();
        let response = service(dir.path()).detect_bbox(&png_bytes(120, 80)).unwrap();

        assert!(response.bbox.x1 < 120 && response.bbox.y1 < 80);
    }

    #[test]
    fn detect_bbox_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let result = service(dir.path()).detect_bbox(b"nope");

        assert!(matches!(result, Err(PhotoLookupError::Hash(HashError::DecodeError { .. }))));
    }

    #[test]
    fn debug_capture_writes_jpeg_and_json() {
        let dir = TempDir::new().unwrap();
        let lookup = service(dir.path());

        let capture = lookup
            .save_debug_capture(&png_bytes(40, 30), Some("1,1,38,28"), None)
            .unwrap();

        assert!(capture.image.starts_with(dir.path().join("debug")));
        let saved = image::open(&capture.image).unwrap();
        assert_eq!((saved.width(), saved.height()), (40, 30));

        let meta: serde_json::Value = serde_json::from_str(&fs::read_to_string(&capture.meta).unwrap()).unwrap();
        assert_eq!(meta["detected_bbox"], serde_json::json!([1, 1, 38, 28]));
        assert!(meta["bbox"].is_null());
    }

    #[test]
    fn config_summary_reports_hash_parameters() {
        let dir = TempDir::new().unwrap();
        let summary = service(dir.path()).config_summary();

        assert_eq!(summary.hash_meta.kind, "phash");
        assert_eq!(summary.top_k_default, 3);
    }
}
