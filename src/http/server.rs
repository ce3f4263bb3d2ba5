//! HTTP server setup and the request dispatcher.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Gate every request on the server status
//! - Dispatch to static serving, proxy pass, terminal routes or a build
//! - Convert any failure into a 500 carrying the status message

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{request::Parts, Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::build::assets::Asset;
use crate::build::orchestrator::Orchestrator;
use crate::build::redeploy::Deployer;
use crate::builders::{prepare_cache_directory, BuilderCache, CommandInstaller, NodeBridge, ProcessLoader};
use crate::config::local::{read_local_config, LocalConfig, SUPPORTED_VERSION};
use crate::config::DevConfig;
use crate::error::DevError;
use crate::http::request::{invoke_request, request_id, request_url};
use crate::http::response::{busy_response, empty, error_response, merge_route_headers, relay, terminal};
use crate::http::{proxy, statics};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::lifecycle::status::{ServerStatus, StatusManager};
use crate::observability::metrics;
use crate::routing::{RouteMatch, Router as RouteTable};
use crate::runtime::{FunctionRuntime, NodeRuntime};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub cwd: Arc<PathBuf>,
    pub config: Arc<DevConfig>,
    pub status: StatusManager,
    pub deployer: Deployer,
    pub runtime: Arc<dyn FunctionRuntime>,
    pub client: reqwest::Client,
}

/// The local development server.
pub struct DevServer {
    state: AppState,
    router: Router,
}

impl DevServer {
    /// Create a server with the subprocess-backed builders and runtime.
    ///
    /// Fails when the builder cache directory cannot be prepared.
    pub fn new(cwd: &Path, config: DevConfig) -> Result<Self, DevError> {
        let builders = &config.builders;
        let cache_dir = prepare_cache_directory(builders.cache_dir.as_deref())?;
        tracing::debug!(path = %cache_dir.display(), "Builder cache ready");

        let build_bridge = NodeBridge::new(&builders.node, Duration::from_secs(builders.build_timeout_secs));
        let invoke_bridge = NodeBridge::new(&builders.node, Duration::from_secs(config.runtime.invoke_timeout_secs));

        let cache = BuilderCache::new(
            cache_dir.clone(),
            Arc::new(CommandInstaller::new(builders.installer.clone())),
            Arc::new(ProcessLoader::new(build_bridge, cache_dir.clone())),
        );
        let runtime = NodeRuntime::new(invoke_bridge, cache_dir);

        Ok(Self::with_components(cwd, config, Arc::new(cache), Arc::new(runtime)))
    }

    /// Create a server around an existing builder cache and runtime.
    pub fn with_components(
        cwd: &Path,
        config: DevConfig,
        cache: Arc<BuilderCache>,
        runtime: Arc<dyn FunctionRuntime>,
    ) -> Self {
        let orchestrator = Orchestrator::new(cache, config.builders.clone(), config.project.clone());
        let state = AppState {
            cwd: Arc::new(cwd.to_path_buf()),
            status: StatusManager::new(config.status.latch_errors),
            deployer: Deployer::new(Arc::new(orchestrator)),
            runtime,
            client: proxy_client(),
            config: Arc::new(config),
        };

        let router = Self::build_router(&state.config, state.clone());
        Self { state, router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DevConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.limits.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn status(&self) -> &StatusManager {
        &self.state.status
    }

    pub fn deployer(&self) -> &Deployer {
        &self.state.deployer
    }

    pub fn config(&self) -> &DevConfig {
        &self.state.config
    }

    /// The service, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, cwd = %self.state.cwd.display(), "Dev server ready");
        self.state.status.set_idle();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Dev server stopped");
        Ok(())
    }
}

/// Upstreams are contacted directly, never through a system proxy.
fn proxy_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default proxy client");
            reqwest::Client::new()
        })
}

/// Request dispatcher.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();

    if let ServerStatus::Busy(message) = state.status.current() {
        return busy_response(&message);
    }

    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let url = request_url(&parts);
    tracing::info!(request_id = %request_id(&parts.headers), "{method} {url}");

    let response = match handle(&state, &parts, body).await {
        Ok(response) => response,
        Err(e) => {
            let message = e.to_string();
            state.status.fail(message.as_str());
            tracing::error!(request_id = %request_id(&parts.headers), error = %message, "Request failed");
            tracing::debug!(detail = %e.detail(), "Failure detail");
            state.status.recover();
            error_response(&message)
        }
    };

    metrics::record_request(&method, response.status().as_u16(), started);
    response
}

async fn handle(state: &AppState, parts: &Parts, body: Body) -> Result<Response, DevError> {
    let cwd = state.cwd.as_path();
    let project = &state.config.project;

    let Some(config) = read_local_config(cwd, &project.config_file)? else {
        let ignore = state.deployer.orchestrator().ignore_list(cwd)?;
        return statics::serve_path(cwd, &ignore, parts, parts.uri.path()).await;
    };
    if config.version != Some(SUPPORTED_VERSION) {
        return Err(DevError::UnsupportedConfigVersion(config.version));
    }

    let routes = RouteTable::from_rules(&config.routes)?;
    let matched = routes.match_request(&request_url(parts));
    tracing::debug!(
        dest = %matched.dest,
        status = matched.status,
        matched_route = ?matched.matched_route,
        "Route resolved"
    );

    let mut response = serve_matched(state, parts, body, &config, &matched).await?;
    merge_route_headers(&mut response, &matched.headers);
    Ok(response)
}

async fn serve_matched(
    state: &AppState,
    parts: &Parts,
    body: Body,
    config: &LocalConfig,
    matched: &RouteMatch,
) -> Result<Response, DevError> {
    let cwd = state.cwd.as_path();

    if matched.is_proxy() {
        return proxy::proxy_pass(&state.client, &matched.dest, parts, body).await;
    }
    if matched.is_terminal() {
        return Ok(terminal(matched.status));
    }

    let Some(specs) = config.build_specs() else {
        let ignore = state.deployer.orchestrator().ignore_list(cwd)?;
        return statics::serve_path(cwd, &ignore, parts, matched.dest_path()).await;
    };

    let assets = {
        let Some(mut guard) = state.status.try_begin("building") else {
            let message = state.status.current().message().unwrap_or("building").to_string();
            return Ok(busy_response(&message));
        };
        state.deployer.deploy(&mut guard, specs, cwd).await?
    };

    match assets.resolve(matched.dest_path()) {
        None => {
            tracing::debug!(dest = %matched.dest, "No asset for destination");
            Ok(empty(StatusCode::NOT_FOUND))
        }
        Some(Asset::StaticFile(file)) => statics::serve_file(&file.fs_path, parts).await,
        Some(Asset::Function(function)) => {
            let handle = state.runtime.create(function).await?;
            let event = invoke_request(parts, body, state.config.limits.max_body_size).await?;
            let invoked = handle.invoke(event).await?;
            Ok(relay(invoked)?)
        }
    }
}
