//! Publishing builds and the watcher-driven rebuild loop.
//!
//! # Data Flow
//! ```text
//! ProjectWatcher ──ChangeEvent──▶ mpsc ──▶ RedeployLoop (single task)
//!                                            → debounce burst
//!                                            → wait for gate, try_begin("rebuilding")
//!                                            → Deployer::deploy → ArcSwap<AssetMap>
//!
//! Request Dispatcher ─────────────────────▶ Deployer::deploy (same gate)
//! ```
//!
//! # Design Decisions
//! - Requests and file events share one [`Deployer`], so there is exactly
//!   one place that publishes asset maps
//! - A failed cycle never touches the published map
//! - Rebuilds wait for the gate instead of being dropped: a change event
//!   must eventually produce a build

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::build::assets::AssetMap;
use crate::build::orchestrator::{BuildError, Orchestrator};
use crate::config::local::{read_local_config, BuildSpec, SUPPORTED_VERSION};
use crate::config::watcher::ChangeEvent;
use crate::error::DevError;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::lifecycle::status::{BusyGuard, StatusManager};

/// Runs build cycles and publishes their asset maps.
#[derive(Debug, Clone)]
pub struct Deployer {
    orchestrator: Arc<Orchestrator>,
    assets: Arc<ArcSwap<AssetMap>>,
}

impl Deployer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            assets: Arc::new(ArcSwap::from_pointee(AssetMap::new())),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The last successfully built asset map.
    pub fn current(&self) -> Arc<AssetMap> {
        self.assets.load_full()
    }

    /// Build under an admitted cycle and publish on success.
    ///
    /// A failure is recorded on the guard, so the status becomes `error`
    /// when the guard drops.
    pub async fn deploy(
        &self,
        guard: &mut BusyGuard,
        specs: &[BuildSpec],
        root: &std::path::Path,
    ) -> Result<Arc<AssetMap>, BuildError> {
        match self.orchestrator.build_project(specs, root).await {
            Ok(assets) => {
                let assets = Arc::new(assets);
                self.assets.store(Arc::clone(&assets));
                Ok(assets)
            }
            Err(e) => {
                guard.fail(e.to_string());
                Err(e)
            }
        }
    }
}

/// Serialized consumer of project change events.
#[derive(Debug)]
pub struct RedeployLoop {
    deployer: Deployer,
    status: StatusManager,
    root: PathBuf,
    config_file: String,
    debounce: Duration,
}

impl RedeployLoop {
    pub fn new(
        deployer: Deployer,
        status: StatusManager,
        root: PathBuf,
        config_file: String,
        debounce: Duration,
    ) -> Self {
        Self {
            deployer,
            status,
            root,
            config_file,
            debounce,
        }
    }

    /// Consume events until the channel closes or shutdown is signalled.
    pub async fn run(self, mut events: mpsc::Receiver<ChangeEvent>, mut shutdown: ShutdownSignal) {
        tracing::debug!(root = %self.root.display(), "Redeploy loop started");
        loop {
            let first = tokio::select! {
                _ = shutdown.recv() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let mut changed = first.paths;
            let mut closed = false;
            // Debounce: keep absorbing events until the burst goes quiet.
            loop {
                match tokio::time::timeout(self.debounce, events.recv()).await {
                    Ok(Some(event)) => changed.extend(event.paths),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            tracing::info!(changes = changed.len(), "Project changed, rebuilding");
            tokio::select! {
                _ = shutdown.recv() => break,
                result = self.redeploy() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Rebuild failed");
                        tracing::debug!(detail = %e.detail(), "Rebuild failure detail");
                        self.status.recover();
                    }
                }
            }

            if closed {
                break;
            }
        }
        tracing::debug!("Redeploy loop stopped");
    }

    /// One rebuild through the shared gate.
    ///
    /// Returns `Ok(false)` when the project has nothing to build.
    pub async fn redeploy(&self) -> Result<bool, DevError> {
        let mut guard = loop {
            self.status.wait_until_not_busy().await;
            if let Some(guard) = self.status.try_begin("rebuilding") {
                break guard;
            }
        };

        let config = match read_local_config(&self.root, &self.config_file) {
            Ok(config) => config,
            Err(e) => {
                guard.fail(e.to_string());
                return Err(e.into());
            }
        };
        let Some(config) = config else {
            return Ok(false);
        };
        if config.version != Some(SUPPORTED_VERSION) {
            let e = DevError::UnsupportedConfigVersion(config.version);
            guard.fail(e.to_string());
            return Err(e);
        }
        let Some(specs) = config.build_specs() else {
            return Ok(false);
        };

        self.deployer.deploy(&mut guard, specs, &self.root).await?;
        Ok(true)
    }
}
