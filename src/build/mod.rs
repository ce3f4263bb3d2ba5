//! Build pipeline.
//!
//! # Data Flow
//! ```text
//! Build specs [{src, use, config}]
//!     → files.rs (walk project, drop ignored paths) → FileSet
//!     → orchestrator.rs (install/load builders, expand globs, build)
//!     → assets.rs (merge outputs) → AssetMap
//!     → redeploy.rs (publish on success)
//!
//! Per request:
//!     route dest → AssetMap::resolve → StaticFile | Function | miss (404)
//! ```
//!
//! # Design Decisions
//! - A cycle is all-or-nothing; partial maps are never published
//! - The published map is swapped atomically and read lock-free

pub mod assets;
pub mod files;
pub mod orchestrator;
pub mod redeploy;

pub use assets::{Asset, AssetMap, FunctionAsset};
pub use orchestrator::{BuildError, Orchestrator};
pub use redeploy::{Deployer, RedeployLoop};
