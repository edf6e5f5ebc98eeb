//! # Config Module
//!
//! Application settings read from `<data_dir>/config.json`.
//!
//! The data directory comes from the caller (the CLI's `--data-dir`) or the
//! `PHOTOLOOKUP_DATA_DIR` environment variable. A missing config file means
//! defaults; unknown keys are ignored.
//!
//! ```json
//! {
//!   "image_library_dirs": ["~/Pictures/scans"],
//!   "top_k_default": 3,
//!   "include_extensions": ["jpg", ".PNG"],
//!   "build_workers": 0
//! }
//! ```

use crate::core::index::{BuilderConfig, IndexSettings, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT};
use crate::core::scanner::{normalize_extension, DEFAULT_EXTENSIONS};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATA_DIR_ENV: &str = "PHOTOLOOKUP_DATA_DIR";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const INDEX_FILE_NAME: &str = "index.json";

pub const DEFAULT_TOP_K: usize = 3;
pub const MAX_TOP_K: usize = 100;

/// Resolved application configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub image_library_dirs: Vec<PathBuf>,
    /// Always `<data_dir>/index.json`
    pub index_path: PathBuf,
    pub top_k_default: usize,
    /// Lowercase, dot-prefixed
    pub include_extensions: Vec<String>,
    pub debug_dir: PathBuf,
    /// 0 = auto, 1 = sequential, N = parallel (capped)
    pub build_workers: usize,
    pub batch_size: usize,
    pub batch_timeout_secs: u64,
}

/// `config.json` as written by hand; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    image_library_dirs: Option<Vec<String>>,
    image_library_paths: Option<Vec<String>>,
    top_k_default: Option<usize>,
    include_extensions: Option<Vec<String>>,
    debug_dir: Option<String>,
    build_workers: Option<usize>,
    batch_size: Option<usize>,
    batch_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Load from `data_dir`, or from `PHOTOLOOKUP_DATA_DIR` when `None`.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => std::env::var_os(DATA_DIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .ok_or(ConfigError::MissingDataDir)?,
        };
        Self::from_data_dir(&data_dir)
    }

    pub fn from_data_dir(data_dir: &Path) -> Result<Self, ConfigError> {
        let data_dir = expand_home(&data_dir.to_string_lossy());
        let config_path = data_dir.join(CONFIG_FILE_NAME);

        let raw = if config_path.exists() {
            let text = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                path: config_path.clone(),
                source,
            })?;
            serde_json::from_str::<RawConfig>(&text).map_err(|e| ConfigError::Parse {
                path: config_path.clone(),
                reason: e.to_string(),
            })?
        } else {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            RawConfig::default()
        };

        Self::resolve(data_dir, raw)
    }

    fn resolve(data_dir: PathBuf, raw: RawConfig) -> Result<Self, ConfigError> {
        let library_dirs = raw
            .image_library_dirs
            .filter(|dirs| !dirs.is_empty())
            .or(raw.image_library_paths)
            .unwrap_or_default();

        let top_k_default = raw.top_k_default.unwrap_or(DEFAULT_TOP_K);
        if !(1..=MAX_TOP_K).contains(&top_k_default) {
            return Err(ConfigError::Invalid(format!(
                "top_k_default must be between 1 and {}, got {}",
                MAX_TOP_K, top_k_default
            )));
        }

        let batch_size = raw.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }

        let include_extensions = match raw.include_extensions {
            Some(list) => list.iter().filter_map(|e| normalize_extension(e)).collect(),
            None => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        };

        let debug_dir = raw
            .debug_dir
            .filter(|d| !d.trim().is_empty())
            .map(|d| expand_home(&d))
            .unwrap_or_else(|| data_dir.join("debug"));

        Ok(Self {
            index_path: data_dir.join(INDEX_FILE_NAME),
            image_library_dirs: library_dirs
                .iter()
                .filter(|d| !d.trim().is_empty())
                .map(|d| expand_home(d))
                .collect(),
            top_k_default,
            include_extensions,
            debug_dir,
            build_workers: raw.build_workers.unwrap_or(0),
            batch_size,
            batch_timeout_secs: raw
                .batch_timeout_secs
                .unwrap_or(DEFAULT_BATCH_TIMEOUT.as_secs())
                .max(1),
            data_dir,
        })
    }

    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            library_dirs: self.image_library_dirs.clone(),
            include_extensions: self.include_extensions.clone(),
            index_path: self.index_path.clone(),
            builder: BuilderConfig {
                workers: self.build_workers,
                batch_size: self.batch_size,
                batch_timeout: Duration::from_secs(self.batch_timeout_secs),
            },
        }
    }
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}
