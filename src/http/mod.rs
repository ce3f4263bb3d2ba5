//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, status gate, dispatcher)
//!     → request.rs (request ID, invocation envelope)
//!     → routing (dest, status, headers)
//!     → proxy.rs | statics.rs | build + runtime
//!     → response.rs (route headers, busy/error bodies, function relay)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod statics;

pub use request::X_REQUEST_ID;
pub use server::{AppState, DevServer};
