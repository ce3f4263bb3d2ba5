//! Crate-level error type.
//!
//! Every subsystem returns its own error; [`DevError`] is what crosses the
//! request boundary, where it becomes a 500 carrying its message.

use thiserror::Error;

use crate::build::files::FilesError;
use crate::build::orchestrator::BuildError;
use crate::builders::BuilderError;
use crate::config::loader::ConfigError;
use crate::config::local::SUPPORTED_VERSION;
use crate::routing::RouteMatchError;
use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum DevError {
    #[error(
        "Only version {} of the deployment config is supported, found {}",
        SUPPORTED_VERSION,
        display_version(.0)
    )]
    UnsupportedConfigVersion(Option<i64>),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteMatchError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Files(#[from] FilesError),

    #[error("Proxy request to {url} failed: {source}")]
    Proxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("Invalid response: {0}")]
    Http(#[from] axum::http::Error),

    #[error("Failed to watch project: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DevError {
    /// Stack trace from a builder or function, if the failure carried one.
    pub fn stack(&self) -> Option<&str> {
        match self {
            DevError::Build(e) => e.stack(),
            DevError::Builder(e) => e.stack(),
            DevError::Runtime(e) => e.stack(),
            _ => None,
        }
    }

    /// What `--debug` prints for a failure: the source chain, then the stack.
    pub fn detail(&self) -> String {
        let chain = error_chain(self);
        match self.stack() {
            Some(stack) => format!("{chain}\n{stack}"),
            None => chain,
        }
    }
}

fn display_version(version: &Option<i64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// Full diagnostic detail: the error and its source chain.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
