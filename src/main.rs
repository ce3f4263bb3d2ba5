//! now-dev: serve a project locally the way the platform would.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ status gate ──busy──▶ "[busy] ..."
//!                          │
//!                          ▼
//!                   config::local (now.json, read per request)
//!                          │
//!                          ▼
//!                   routing (first match wins, $N rewrite)
//!                          │
//!          ┌───────────────┼───────────────┬────────────────────┐
//!          ▼               ▼               ▼                    ▼
//!     proxy pass     301/302/404     static files     build::orchestrator
//!                                                          │
//!                                        builders (cache, installer, node bridge)
//!                                                          │
//!                                                          ▼
//!                                              AssetMap ──▶ static file | runtime
//!
//!     config::watcher ──▶ build::redeploy (same status gate)
//! ```

use std::path::PathBuf;

use clap::Parser;

use now_dev::config::loader::load_config;
use now_dev::config::DevConfig;
use now_dev::lifecycle::{signals, startup, Shutdown};
use now_dev::observability::logging;

#[derive(Parser)]
#[command(name = "now-dev")]
#[command(about = "Serve a project locally, building and invoking it on demand", long_about = None)]
struct Cli {
    /// Project directory
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Print debug output, including failure stacks
    #[arg(short, long)]
    debug: bool,

    /// Dev server settings (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rebuild when project files change
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DevConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if cli.watch {
        config.watcher.enabled = true;
    }

    logging::init_logging(&config.observability.log_level, cli.debug);
    tracing::info!("now-dev v{} starting", env!("CARGO_PKG_VERSION"));

    let cwd = cli.dir.canonicalize()?;
    tracing::info!(
        cwd = %cwd.display(),
        bind_address = %config.listener.bind_address(),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    startup::run(cwd, config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
