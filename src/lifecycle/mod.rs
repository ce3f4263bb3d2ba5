//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Prepare builder cache → Start watcher + rebuild
//!     loop (optional) → Bind listener → idle → Serve
//!
//! Status (status.rs):
//!     busy("starting") → idle → busy(phase) → idle | error(message)
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → sticky flag → server drains, rebuild loop stops
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then cache, then listener
//! - A cache directory that cannot be prepared is fatal before listening
//! - One status gate shared by requests and file-change rebuilds

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod status;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use status::{BusyGuard, ServerStatus, StatusManager};
