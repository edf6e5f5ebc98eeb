//! # Events Module
//!
//! Progress reporting for index builds.
//!
//! ## Design
//! The builder and store emit events through channels, so the build
//! coordinator, the CLI progress bar, or tests can observe a build
//! without the core knowing who is listening.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Hash(HashEvent::Progress(p)) = event {
//!             println!("Hashed {} of {} found", p.completed, p.discovered);
//!         }
//!     }
//! });
//!
//! store.build(&sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
