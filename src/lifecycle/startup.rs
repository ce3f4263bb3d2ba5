//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Prepare the builder cache and construct the server
//! - Start the project watcher and rebuild loop when enabled
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last; the status stays `starting` until then

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::build::redeploy::RedeployLoop;
use crate::config::loader::ConfigError;
use crate::config::schema::DevConfig;
use crate::config::validation::validate_config;
use crate::config::watcher::ProjectWatcher;
use crate::error::DevError;
use crate::http::DevServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

/// Run the dev server for `cwd` until `shutdown` fires.
pub async fn run(cwd: PathBuf, config: DevConfig, shutdown: Shutdown) -> Result<(), DevError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = DevServer::new(&cwd, config)?;
    let config = server.config().clone();

    // The watcher handle must outlive the server.
    let _watcher = if config.watcher.enabled {
        let ignore = server.deployer().orchestrator().ignore_list(&cwd)?;
        let (tx, rx) = ProjectWatcher::channel();
        let watcher = ProjectWatcher::new(&cwd, ignore, &config.watcher).run(tx)?;

        let redeploy = RedeployLoop::new(
            server.deployer().clone(),
            server.status().clone(),
            cwd.clone(),
            config.project.config_file.clone(),
            Duration::from_millis(config.watcher.debounce_ms),
        );
        tokio::spawn(redeploy.run(rx, shutdown.subscribe()));
        Some(watcher)
    } else {
        None
    };

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        watch = config.watcher.enabled,
        "Listening for connections"
    );

    server.run(listener, shutdown.subscribe()).await?;
    Ok(())
}
