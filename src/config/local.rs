//! The project's deployment config (`now.json`).
//!
//! Read fresh on every request so edits take effect without a restart.
//! A missing file is not an error: the project is then served as plain
//! static files.

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::loader::ConfigError;

/// The only deployment config version the dev server understands.
pub const SUPPORTED_VERSION: i64 = 2;

/// Deployment config as found in the project root.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocalConfig {
    /// Config version. Anything other than 2 is rejected.
    #[serde(default)]
    pub version: Option<i64>,

    /// Ordered build specs.
    #[serde(default)]
    pub builds: Option<Vec<BuildSpec>>,

    /// Ordered route rules. Order is precedence.
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

impl LocalConfig {
    /// Build specs, or `None` when the project declares none.
    pub fn build_specs(&self) -> Option<&[BuildSpec]> {
        match self.builds.as_deref() {
            Some(specs) if !specs.is_empty() => Some(specs),
            _ => None,
        }
    }
}

/// One entry of `builds`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BuildSpec {
    /// Glob of entrypoints, relative to the project root.
    pub src: String,

    /// Builder package name.
    #[serde(rename = "use")]
    pub builder: String,

    /// Builder-specific options, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl fmt::Display for BuildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with {}", self.src, self.builder)
    }
}

/// One entry of `routes`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteRule {
    /// Pattern matched against the request path, anchored at both ends.
    pub src: String,

    /// Destination template; `$N` refers to capture group N. An absolute
    /// URL turns the route into a proxy pass. Absent keeps the request path.
    #[serde(default)]
    pub dest: Option<String>,

    /// Status override.
    #[serde(default)]
    pub status: Option<u16>,

    /// Response headers, in declaration order.
    #[serde(default, deserialize_with = "ordered_headers")]
    pub headers: Vec<(String, String)>,
}

impl RouteRule {
    /// Rule with only a pattern and a destination.
    pub fn rewrite(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: Some(dest.into()),
            status: None,
            headers: Vec::new(),
        }
    }
}

/// Keeps header entries in document order; a JSON object visited through
/// `MapAccess` yields its entries as written.
fn ordered_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedHeaders;

    impl<'de> Visitor<'de> for OrderedHeaders {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of header names to string values")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut headers = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, value)) = map.next_entry::<String, String>()? {
                headers.push((name, value));
            }
            Ok(headers)
        }
    }

    deserializer.deserialize_map(OrderedHeaders)
}

/// Read the project's deployment config.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_local_config(cwd: &Path, file_name: &str) -> Result<Option<LocalConfig>, ConfigError> {
    let path = cwd.join(file_name);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let config = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(config))
}
