//! Response construction.
//!
//! # Responsibilities
//! - Busy placeholder, error and empty responses
//! - Merge route headers into whatever response was produced
//! - Relay a function's response to the client
//!
//! # Design Decisions
//! - Route headers never override a header the response already carries
//! - Within one rule, a later header of the same name wins

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::runtime::{InvokeResponse, RuntimeError};

/// Placeholder served while a build cycle runs.
pub fn busy_response(message: &str) -> Response {
    (StatusCode::OK, format!("[busy] {message}...")).into_response()
}

/// Request failure; the body is the status message only.
pub fn error_response(message: &str) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_string()).into_response()
}

pub fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Terminal route response: no body, route headers are merged by the caller.
pub fn terminal(status: u16) -> Response {
    empty(StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_FOUND))
}

/// Compile route headers; invalid names or values are skipped.
pub fn route_header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid route header"),
        }
    }
    map
}

/// Add route headers the response does not already set.
pub fn merge_route_headers(response: &mut Response, headers: &[(String, String)]) {
    if headers.is_empty() {
        return;
    }
    let target = response.headers_mut();
    for (name, value) in route_header_map(headers) {
        if let Some(name) = name {
            if !target.contains_key(&name) {
                target.insert(name, value);
            }
        }
    }
}

/// Turn a function's return value into an HTTP response.
pub fn relay(invoked: InvokeResponse) -> Result<Response, RuntimeError> {
    let status = StatusCode::from_u16(invoked.status_code)
        .map_err(|_| RuntimeError::Response(format!("invalid status code {}", invoked.status_code)))?;
    let body = invoked.body_bytes()?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in &invoked.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid function response header"),
        }
    }
    Ok(response)
}
