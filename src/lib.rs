//! Local development server for serverless deployments.
//!
//! Serves a project directory the way the platform would: requests are
//! matched against the project's route table, sources are built on demand
//! by builder packages, and the resulting functions are invoked per request.

// Core subsystems
pub mod config;
pub mod http;
pub mod routing;

// Build pipeline
pub mod build;
pub mod builders;
pub mod runtime;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::DevConfig;
pub use error::DevError;
pub use http::DevServer;
pub use lifecycle::{Shutdown, StatusManager};
