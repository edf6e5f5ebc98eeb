//! # Error Module
//!
//! Error types for the photo lookup service.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Keep failures local** - one bad file is an entry in a build's error
//!   list, never a failed build
//! - **Distinct classes** - "index not loaded" and "build already running"
//!   are separate variants so callers can map them to distinct responses

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum PhotoLookupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while decoding or hashing a single image
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to decode image {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Image is empty or corrupted: {path}")]
    EmptyImage { path: PathBuf },

    #[error("Invalid region {region} for a {width}x{height} image")]
    InvalidRegion {
        region: String,
        width: u32,
        height: u32,
    },

    #[error("Invalid hash '{value}': {reason}")]
    InvalidHash { value: String, reason: String },

    #[error("Hash computation failed: {0}")]
    ComputationFailed(String),

    #[error("Failed to open image file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the persistent index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index not loaded. Build the index first.")]
    NotLoaded,

    #[error("Index file {path} is corrupt ({reason}). Rebuild the index to replace it.")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Failed to read index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write index {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize index: {0}")]
    Serialize(String),
}

/// Errors raised when starting a background build
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Build already in progress ({operation} started at {started_at})")]
    AlreadyRunning {
        operation: String,
        started_at: String,
    },

    #[error("Failed to start build thread: {0}")]
    SpawnFailed(String),

    #[error("Build failed: {0}")]
    Failed(String),
}

/// Errors that occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "PHOTOLOOKUP_DATA_DIR is not set. Point it at the directory holding config.json and index.json."
    )]
    MissingDataDir,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, PhotoLookupError>;
