//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request target (/path?query)
//!     → router.rs (ordered lookup, first match wins)
//!     → matcher.rs (anchored regex, $N expansion)
//!     → RouteMatch { dest, status, headers }
//!
//! Route Compilation (per request):
//!     now.json routes[]
//!     → compile each src as ^(?:src)$
//!     → Router (immutable for the request)
//! ```
//!
//! # Design Decisions
//! - Routes are re-read and recompiled per request so edits apply immediately
//! - Only the path takes part in matching; the query is reattached afterwards
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::RouteMatchError;
pub use router::{RouteMatch, Router};
