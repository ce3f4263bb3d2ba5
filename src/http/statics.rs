//! Static file serving.
//!
//! # Responsibilities
//! - Serve the project directory when there is no deployment config
//! - Serve a rewritten destination from the project directory
//! - Serve a built static asset from its own location on disk
//!
//! # Design Decisions
//! - Delegates to `tower-http` (`ServeDir`, `ServeFile`) for ranges,
//!   conditional requests and content types
//! - Ignored paths are answered with 404, never read. The check runs on
//!   the decoded path, the same one `ServeDir` opens

use std::path::Path;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode, Uri};
use axum::response::Response;
use percent_encoding::percent_decode_str;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::build::files::IgnoreList;
use crate::error::DevError;
use crate::http::response::empty;

/// A body-less copy of the request, pointed at `path`.
fn retarget(parts: &Parts, path: &str) -> Result<Request<Body>, DevError> {
    let uri = if path.starts_with('/') {
        Uri::try_from(path)
    } else {
        Uri::try_from(format!("/{path}"))
    }
    .map_err(axum::http::Error::from)?;

    let mut request = Request::new(Body::empty());
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = parts.headers.clone();
    Ok(request)
}

/// The project-relative path a request path names on disk.
///
/// `None` when it is not valid UTF-8 once decoded or climbs out of the root.
fn decoded_relative(path: &str) -> Option<String> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let rel = decoded.trim_start_matches('/');
    if rel.split(['/', '\\']).any(|component| component == "..") {
        return None;
    }
    Some(rel.to_string())
}

/// Serve `path` from `root`, unless the ignore list hides it.
pub async fn serve_path(root: &Path, ignore: &IgnoreList, parts: &Parts, path: &str) -> Result<Response, DevError> {
    let hidden = match decoded_relative(path) {
        Some(rel) => ignore.ignores(&rel, false),
        None => true,
    };
    if hidden {
        tracing::debug!(path = %path, "Ignored path requested");
        return Ok(empty(StatusCode::NOT_FOUND));
    }

    let request = retarget(parts, path)?;
    let response = match ServeDir::new(root).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(Body::new))
}

/// Serve a single file regardless of the request path.
pub async fn serve_file(fs_path: &Path, parts: &Parts) -> Result<Response, DevError> {
    let request = retarget(parts, "/")?;
    let response = match ServeFile::new(fs_path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(Body::new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProjectConfig;

    fn parts(uri: &str) -> Parts {
        Request::get(uri).body(()).unwrap().into_parts().0
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn project() -> (tempfile::TempDir, IgnoreList) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "[core]").unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/x")).unwrap();
        std::fs::write(dir.path().join("node_modules/x/index.js"), "dep").unwrap();
        let ignore = IgnoreList::for_project(dir.path(), &ProjectConfig::default(), None).unwrap();
        (dir, ignore)
    }

    #[tokio::test]
    async fn test_serves_rewritten_path() {
        let (dir, ignore) = project();
        let response = serve_path(dir.path(), &ignore, &parts("/anything"), "/index.html")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_directory_serves_index() {
        let (dir, ignore) = project();
        let response = serve_path(dir.path(), &ignore, &parts("/"), "/").await.unwrap();
        assert_eq!(body_string(response).await, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_ignored_path_is_not_found() {
        let (dir, ignore) = project();
        let response = serve_path(dir.path(), &ignore, &parts("/.git/config"), "/.git/config")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_encoded_ignored_path_is_not_found() {
        let (dir, ignore) = project();
        for path in [
            "/%2Egit/config",
            "/%2egit/config",
            "/.git%2Fconfig",
            "/node%5Fmodules/x/index.js",
            "/%6Eode_modules/x/index.js",
        ] {
            let response = serve_path(dir.path(), &ignore, &parts(path), path).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn test_encoded_plain_path_is_served() {
        let (dir, ignore) = project();
        std::fs::write(dir.path().join("my page.html"), "spaced").unwrap();
        let response = serve_path(dir.path(), &ignore, &parts("/my%20page.html"), "/my%20page.html")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "spaced");
    }

    #[test]
    fn test_decoded_relative() {
        assert_eq!(decoded_relative("/%2Egit/config").as_deref(), Some(".git/config"));
        assert_eq!(decoded_relative("/a/%2E%2E/b"), None);
        assert_eq!(decoded_relative("/a/..%5Cb"), None);
        assert_eq!(decoded_relative("/%FF"), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (dir, ignore) = project();
        let response = serve_path(dir.path(), &ignore, &parts("/nope.css"), "/nope.css")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_file_ignores_request_path() {
        let (dir, _) = project();
        let response = serve_file(&dir.path().join("index.html"), &parts("/blog"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "<h1>home</h1>");
    }
}
