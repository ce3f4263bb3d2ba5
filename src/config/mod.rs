//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Dev server settings (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DevConfig (validated, immutable)
//!
//! Project deployment config (now.json, per request)
//!     → local.rs (parse) → LocalConfig { version, builds, routes }
//!
//! Project files (optional watch mode):
//!     watcher.rs detects change → ChangeEvent → rebuild loop
//! ```
//!
//! # Design Decisions
//! - Server settings are immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - The project config is never cached, so edits apply on the next request

pub mod loader;
pub mod local;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use local::{read_local_config, BuildSpec, LocalConfig, RouteRule};
pub use schema::DevConfig;
