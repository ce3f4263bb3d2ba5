//! Proxy pass for routes whose destination is an absolute URL.
//!
//! Behaves like nginx `proxy_pass` with origin change: the upstream sees
//! its own host, the client sees the upstream's status, headers and body.
//! Bodies are streamed in both directions.

use axum::body::{Body, HttpBody};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::response::Response;

use crate::error::DevError;

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Copy `headers` without hop-by-hop headers (and `host`, when asked).
pub fn forwardable_headers(headers: &HeaderMap, drop_host: bool) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) || (drop_host && name == header::HOST) {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// Forward the request to `dest` and relay the upstream response.
pub async fn proxy_pass(client: &reqwest::Client, dest: &str, parts: &Parts, body: Body) -> Result<Response, DevError> {
    tracing::debug!(method = %parts.method, dest = %dest, "Proxy pass");

    let mut request = client
        .request(parts.method.clone(), dest)
        .headers(forwardable_headers(&parts.headers, true));
    if body.size_hint().exact() != Some(0) {
        request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = request
        .send()
        .await
        .map_err(|source| DevError::Proxy {
            url: dest.to_string(),
            source,
        })?;

    let status = upstream.status();
    let headers = forwardable_headers(upstream.headers(), false);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
