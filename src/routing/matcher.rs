//! Route matching logic.
//!
//! # Responsibilities
//! - Compile a route's `src` into a fully anchored regex
//! - Expand `$N` backreferences in destinations and header values
//! - Recognise absolute-URL destinations (proxy pass)
//!
//! # Design Decisions
//! - `src` is wrapped as `^(?:src)$` so alternations stay anchored
//! - Unmatched or out-of-range groups expand to the empty string
//! - Patterns are matched against the path only; the query is carried aside

use regex::{Captures, Regex};
use thiserror::Error;
use url::Url;

use crate::config::local::RouteRule;

/// A route whose pattern is not a valid regular expression.
#[derive(Debug, Error)]
pub enum RouteMatchError {
    #[error("Invalid route #{index} pattern `{pattern}`: {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One route rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    index: usize,
    pattern: Regex,
    rule: RouteRule,
}

impl RouteMatcher {
    /// Compile the rule at position `index` of the route table.
    pub fn compile(index: usize, rule: RouteRule) -> Result<Self, RouteMatchError> {
        let pattern = Regex::new(&format!("^(?:{})$", rule.src)).map_err(|source| {
            RouteMatchError::InvalidPattern {
                index,
                pattern: rule.src.clone(),
                source,
            }
        })?;
        Ok(Self { index, pattern, rule })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rule(&self) -> &RouteRule {
        &self.rule
    }

    /// Captures when `path` matches the whole pattern.
    pub fn captures<'p>(&self, path: &'p str) -> Option<Captures<'p>> {
        self.pattern.captures(path)
    }
}

/// Replace `$N` in `template` with capture group `N`.
///
/// A `$` not followed by a digit is kept literally.
pub fn expand_backreferences(template: &str, captures: &Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();

        if digits == 0 {
            out.push('$');
            rest = after;
            continue;
        }

        if let Ok(group) = after[..digits].parse::<usize>() {
            if let Some(m) = captures.get(group) {
                out.push_str(m.as_str());
            }
        }
        rest = &after[digits..];
    }

    out.push_str(rest);
    out
}

/// Whether a destination should be proxied rather than resolved locally.
pub fn is_absolute_url(dest: &str) -> bool {
    Url::parse(dest)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}
