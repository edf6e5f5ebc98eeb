//! # photo-lookup CLI
//!
//! Command-line interface for the photo lookup service.
//!
//! ## Usage
//! ```bash
//! photo-lookup --data-dir ~/.photo-lookup build
//! photo-lookup lookup scan.jpg --detect --output json
//! ```

mod cli;

use photo_lookup::Result;

fn main() -> Result<()> {
    photo_lookup::init_tracing();
    cli::run()
}
