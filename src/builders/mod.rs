//! Builder packages: contract, cache and installer.
//!
//! # Data Flow
//! ```text
//! Build spec names a builder ("@now/node")
//!     → cache.rs (exists under <cache>/node_modules? else installer.rs)
//!     → cache.rs load (BuilderLoader → Arc<dyn Builder>)
//!     → Builder::build({files, entrypoint, workPath, config})
//!     → process.rs (node bridge over stdio) → named outputs
//! ```
//!
//! # Design Decisions
//! - Builder packages live in a private cache outside the project tree
//! - Existence of the package directory is the cache hit test
//! - Loading goes through a subprocess protocol, never in-process code loading
//! - Concurrent installs of the same builder are coalesced

pub mod cache;
pub mod installer;
pub mod process;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::build::assets::Asset;
use crate::build::files::FileSet;

pub use cache::{prepare_cache_directory, BuilderCache};
pub use installer::{CommandInstaller, PackageInstaller};
pub use process::{BridgeError, NodeBridge, ProcessLoader};

/// Input for one entrypoint build.
#[derive(Debug, Clone, Copy)]
pub struct BuildInput<'a> {
    /// Every project file, not just the entrypoint.
    pub files: &'a FileSet,
    pub entrypoint: &'a str,
    pub work_path: &'a Path,
    pub config: &'a serde_json::Value,
}

/// Named outputs of one entrypoint build.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildOutput {
    #[serde(default)]
    pub outputs: BTreeMap<String, Asset>,
}

/// A loaded builder.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Package name this builder was loaded from.
    fn name(&self) -> &str;

    /// Build a single entrypoint.
    async fn build(&self, input: BuildInput<'_>) -> Result<BuildOutput, BuilderError>;
}

/// Turns an installed package directory into a [`Builder`].
pub trait BuilderLoader: Send + Sync {
    fn load(&self, name: &str, package_dir: &Path) -> Result<std::sync::Arc<dyn Builder>, BuilderError>;
}

/// Errors from the builder cache, the installer, or a builder itself.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// The cache directory cannot be created or written.
    #[error("Could not create cache directory for builders at {path}: {source}")]
    CacheInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The package installer failed.
    #[error("Failed to install builder {name}: {reason}")]
    Install { name: String, reason: String },

    /// The package is missing after installation.
    #[error("Builder {name} is not installed at {path}")]
    NotFound { name: String, path: PathBuf },

    /// The builder ran and reported an error.
    #[error("{message}")]
    Failed {
        message: String,
        stack: Option<String>,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl BuilderError {
    /// Stack trace reported by the builder, if any.
    pub fn stack(&self) -> Option<&str> {
        match self {
            BuilderError::Failed { stack, .. } => stack.as_deref(),
            BuilderError::Bridge(e) => e.stack(),
            _ => None,
        }
    }
}
