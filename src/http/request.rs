//! Request handling and transformation.
//!
//! # Responsibilities
//! - Expose the request ID assigned by the request-id layer
//! - Turn an incoming request into a function invocation envelope
//!
//! # Design Decisions
//! - The body is read whole (bounded) and always sent base64-encoded
//! - Repeated headers are folded into one comma-separated value

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::DevError;
use crate::runtime::InvokeRequest;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// The request ID, or `unknown` when none was assigned.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Request target as received: path plus query.
pub fn request_url(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string())
}

/// Headers as a name → value map, lowercase names.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}

/// Build the invocation envelope for a function.
pub async fn invoke_request(parts: &Parts, body: Body, max_body_size: usize) -> Result<InvokeRequest, DevError> {
    let bytes = axum::body::to_bytes(body, max_body_size).await?;
    Ok(InvokeRequest {
        method: parts.method.to_string(),
        path: request_url(parts),
        headers: flatten_headers(&parts.headers),
        body: STANDARD.encode(&bytes),
        encoding: "base64".to_string(),
    })
}
