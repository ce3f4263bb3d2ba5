//! Builder cache and installer.
//!
//! # Responsibilities
//! - Prepare a private directory outside the project for builder packages
//! - Install builders on demand, at most once per name at a time
//! - Load installed builders and keep them for the process lifetime

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::builders::installer::PackageInstaller;
use crate::builders::{Builder, BuilderError, BuilderLoader};
use crate::observability::metrics;

/// Directory name under the platform cache dir.
pub const CACHE_NAMESPACE: &str = "co.zeit.now-builders";

/// Keeps the cache directory from ever being published as a project.
const PRIVATE_MANIFEST: &str = "{\"private\":true}";

/// Create (or reuse) the builder cache directory.
///
/// Idempotent: calling it twice yields the same path and leaves an
/// existing manifest untouched.
pub fn prepare_cache_directory(override_dir: Option<&Path>) -> Result<PathBuf, BuilderError> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_NAMESPACE),
    };

    let init_error = |source| BuilderError::CacheInit {
        path: dir.clone(),
        source,
    };

    std::fs::create_dir_all(&dir).map_err(init_error)?;

    let manifest = dir.join("package.json");
    if !manifest.is_file() {
        std::fs::write(&manifest, PRIVATE_MANIFEST).map_err(init_error)?;
    }

    tracing::debug!(path = %dir.display(), "Builder cache ready");
    Ok(dir)
}

/// Installed builder packages plus the builders loaded from them.
pub struct BuilderCache {
    dir: PathBuf,
    installer: Arc<dyn PackageInstaller>,
    loader: Arc<dyn BuilderLoader>,
    loaded: DashMap<String, Arc<dyn Builder>>,
    installs: DashMap<String, Arc<Mutex<()>>>,
}

impl BuilderCache {
    /// `dir` must come from [`prepare_cache_directory`].
    pub fn new(dir: PathBuf, installer: Arc<dyn PackageInstaller>, loader: Arc<dyn BuilderLoader>) -> Self {
        Self {
            dir,
            installer,
            loader,
            loaded: DashMap::new(),
            installs: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where an installed package lives.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.dir.join("node_modules").join(name)
    }

    /// Cache hit test.
    pub async fn is_installed(&self, name: &str) -> bool {
        tokio::fs::metadata(self.package_dir(name))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Install `name` unless it is already present.
    ///
    /// Concurrent callers for the same name share one installer run: the
    /// losers wait on the per-name lock and then find the package present.
    pub async fn ensure_installed(&self, name: &str) -> Result<(), BuilderError> {
        if self.is_installed(name).await {
            return Ok(());
        }

        let lock = Arc::clone(&self.installs.entry(name.to_string()).or_default());
        let _guard = lock.lock().await;

        if self.is_installed(name).await {
            tracing::debug!(builder = %name, "Installed by a concurrent request");
            return Ok(());
        }

        tracing::info!(builder = %name, "Pulling builder");
        metrics::record_builder_install(name);
        self.installer.install(&self.dir, name).await
    }

    /// Load an installed builder.
    pub fn load(&self, name: &str) -> Result<Arc<dyn Builder>, BuilderError> {
        if let Some(builder) = self.loaded.get(name) {
            return Ok(Arc::clone(builder.value()));
        }

        let package_dir = self.package_dir(name);
        if !package_dir.is_dir() {
            return Err(BuilderError::NotFound {
                name: name.to_string(),
                path: package_dir,
            });
        }

        let builder = self.loader.load(name, &package_dir)?;
        self.loaded.insert(name.to_string(), Arc::clone(&builder));
        Ok(builder)
    }
}

impl std::fmt::Debug for BuilderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderCache")
            .field("dir", &self.dir)
            .field("loaded", &self.loaded.len())
            .finish()
    }
}
