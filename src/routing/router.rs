//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Find the first route matching a request path
//! - Produce the rewritten destination, status and headers
//!
//! # Design Decisions
//! - Built per request from the freshly read config (cheap at dev scale)
//! - First match wins; later routes are never evaluated
//! - No match is not an error: the request path passes through with 200

use crate::config::local::RouteRule;
use crate::routing::matcher::{expand_backreferences, is_absolute_url, RouteMatcher, RouteMatchError};

/// Statuses that end the request without a build or a body.
pub const TERMINAL_STATUSES: [u16; 3] = [301, 302, 404];

/// Outcome of matching a request against the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Rewritten destination, query included.
    pub dest: String,
    pub status: u16,
    /// Headers to merge into the response, in declaration order.
    pub headers: Vec<(String, String)>,
    /// Index of the winning rule.
    pub matched_route: Option<usize>,
}

impl RouteMatch {
    /// The destination is an absolute URL to proxy to.
    pub fn is_proxy(&self) -> bool {
        is_absolute_url(&self.dest)
    }

    /// Redirects and explicit not-founds stop here.
    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATUSES.contains(&self.status)
    }

    /// Destination without its query string.
    pub fn dest_path(&self) -> &str {
        self.dest.split_once('?').map_or(self.dest.as_str(), |(path, _)| path)
    }
}

/// Ordered, compiled route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<RouteMatcher>,
}

impl Router {
    /// Compile the route table; a malformed pattern fails the whole table.
    pub fn from_rules(rules: &[RouteRule]) -> Result<Self, RouteMatchError> {
        let routes = rules
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, rule)| RouteMatcher::compile(index, rule))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// Match a request target (`/path?query`).
    pub fn match_request(&self, request_url: &str) -> RouteMatch {
        let (path, query) = match request_url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (request_url, None),
        };

        for route in &self.routes {
            let Some(captures) = route.captures(path) else {
                continue;
            };
            let rule = route.rule();

            let mut dest = match &rule.dest {
                Some(template) => expand_backreferences(template, &captures),
                None => path.to_string(),
            };
            if let Some(query) = query.filter(|q| !q.is_empty()) {
                if !dest.contains('?') {
                    dest.push('?');
                    dest.push_str(query);
                }
            }

            let headers = rule
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), expand_backreferences(value, &captures)))
                .collect();

            tracing::trace!(route = route.index(), src = %rule.src, dest = %dest, "Route matched");

            return RouteMatch {
                dest,
                status: rule.status.unwrap_or(200),
                headers,
                matched_route: Some(route.index()),
            };
        }

        RouteMatch {
            dest: request_url.to_string(),
            status: 200,
            headers: Vec::new(),
            matched_route: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(rules: Vec<RouteRule>) -> Router {
        Router::from_rules(&rules).unwrap()
    }

    #[test]
    fn test_backreference_keeps_query() {
        let r = router(vec![RouteRule::rewrite("/blog/(.*)", "/posts/$1")]);
        let m = r.match_request("/blog/hello?x=1");

        assert_eq!(m.dest, "/posts/hello?x=1");
        assert_eq!(m.status, 200);
        assert_eq!(m.matched_route, Some(0));
        assert_eq!(m.dest_path(), "/posts/hello");
    }

    #[test]
    fn test_rule_query_is_not_overridden() {
        let r = router(vec![RouteRule::rewrite("/p/(\\d+)", "/post.js?id=$1")]);
        assert_eq!(r.match_request("/p/7?utm=mail").dest, "/post.js?id=7");
    }

    #[test]
    fn test_first_match_wins() {
        let r = router(vec![
            RouteRule::rewrite("/a/.*", "/first"),
            RouteRule::rewrite("/a/b", "/second"),
            RouteRule::rewrite(".*", "/catch-all"),
        ]);
        let m = r.match_request("/a/b");
        assert_eq!(m.dest, "/first");
        assert_eq!(m.matched_route, Some(0));

        assert_eq!(r.match_request("/z").matched_route, Some(2));
    }

    #[test]
    fn test_no_match_passes_through() {
        let r = router(vec![RouteRule::rewrite("/api/(.*)", "/api/$1.js")]);
        let m = r.match_request("/static/app.css?v=3");

        assert_eq!(m.dest, "/static/app.css?v=3");
        assert_eq!(m.status, 200);
        assert!(m.headers.is_empty());
        assert_eq!(m.matched_route, None);
        assert!(!m.is_terminal());
    }

    #[test]
    fn test_redirect_with_headers() {
        let rule = RouteRule {
            src: "/old/(.*)".into(),
            dest: None,
            status: Some(301),
            headers: vec![
                ("Location".into(), "/new/$1".into()),
                ("Cache-Control".into(), "no-cache".into()),
            ],
        };
        let m = router(vec![rule]).match_request("/old/page");

        assert!(m.is_terminal());
        assert_eq!(m.dest, "/old/page");
        assert_eq!(
            m.headers,
            vec![
                ("Location".to_string(), "/new/page".to_string()),
                ("Cache-Control".to_string(), "no-cache".to_string()),
            ]
        );
    }

    #[test]
    fn test_proxy_destination() {
        let r = router(vec![RouteRule::rewrite("/gh/(.*)", "https://api.github.com/$1")]);
        let m = r.match_request("/gh/users?page=2");
        assert!(m.is_proxy());
        assert_eq!(m.dest, "https://api.github.com/users?page=2");
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [301, 302, 404] {
            let rule = RouteRule {
                status: Some(status),
                ..RouteRule::rewrite("/x", "/y")
            };
            assert!(router(vec![rule]).match_request("/x").is_terminal());
        }
        let rule = RouteRule {
            status: Some(418),
            ..RouteRule::rewrite("/x", "/y")
        };
        assert!(!router(vec![rule]).match_request("/x").is_terminal());
    }

    #[test]
    fn test_malformed_table_is_rejected() {
        let rules = vec![RouteRule::rewrite("/ok", "/"), RouteRule::rewrite("/[", "/")];
        assert!(Router::from_rules(&rules).is_err());
    }
}
