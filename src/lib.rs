//! # Photo Lookup
//!
//! Finds the library photo a scanned print came from.
//!
//! A scan is hashed (optionally only the photograph inside its border) and
//! compared against a persistent perceptual-hash index of the library.
//!
//! ## Architecture
//! The library is split into a core engine and thin presentation layers:
//! - `core` - Detection, hashing, indexing and background builds
//! - `service` - The facade front ends call
//! - `config` - `config.json` loading
//! - `events` - Progress reporting over channels
//! - `error` - Error types

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod service;

// Re-export commonly used types at the crate root
pub use config::AppConfig;
pub use error::{PhotoLookupError, Result};
pub use service::PhotoLookup;

/// Initialize tracing for the binary.
///
/// Honors `RUST_LOG`, defaulting to `info`. Does nothing if a subscriber is
/// already installed.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
