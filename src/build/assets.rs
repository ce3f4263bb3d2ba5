//! Build outputs and their lookup.
//!
//! # Responsibilities
//! - Model the two kinds of build output (static file, function)
//! - Hold one build cycle's outputs as an [`AssetMap`]
//! - Resolve a route destination to an asset, with directory-index fallback
//!
//! # Design Decisions
//! - Keys are project-relative and never start with `/`
//! - A miss is `None`, which the dispatcher answers with 404

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::build::files::FileRef;

/// A single build output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Asset {
    /// A file served verbatim from disk.
    #[serde(rename = "FileFsRef")]
    StaticFile(FileRef),

    /// Packaged code invoked per request.
    #[serde(rename = "Lambda")]
    Function(FunctionAsset),
}

/// A packaged function (Lambda-style).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAsset {
    /// Zipped code bundle.
    #[serde(rename = "zipBuffer", with = "base64_bytes")]
    pub code: Vec<u8>,

    /// Entry-point handle, e.g. `index.handler`.
    pub handler: String,

    /// Runtime identifier, e.g. `nodejs8.10`.
    pub runtime: String,

    /// Environment variables for the function.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Outputs of one build cycle, keyed by output path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetMap {
    assets: BTreeMap<String, Asset>,
}

impl AssetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an output. An existing key is overwritten.
    pub fn insert(&mut self, key: impl Into<String>, asset: Asset) -> Option<Asset> {
        let key = key.into();
        let key = key.trim_start_matches('/').to_string();
        self.assets.insert(key, asset)
    }

    /// Merge a builder's outputs; later outputs win on key collision.
    pub fn extend(&mut self, outputs: impl IntoIterator<Item = (String, Asset)>) {
        for (key, asset) in outputs {
            self.insert(key, asset);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Asset> {
        self.assets.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Find the asset responsible for a route destination.
    ///
    /// Exact key first; otherwise the first `<dest>/index.<ext>` key.
    pub fn resolve(&self, dest: &str) -> Option<&Asset> {
        let key = dest.strip_prefix('/').unwrap_or(dest);
        if let Some(asset) = self.assets.get(key) {
            return Some(asset);
        }

        let wanted = key.strip_suffix('/').unwrap_or(key);
        self.assets
            .iter()
            .find(|(name, _)| strip_index_suffix(name) == Some(wanted))
            .map(|(_, asset)| asset)
    }
}

/// `blog/index.html` → `blog`, `index.js` → ``; `None` for non-index names.
fn strip_index_suffix(name: &str) -> Option<&str> {
    let (dir, file) = match name.rfind('/') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => ("", name),
    };
    let ext = file.strip_prefix("index.")?;
    if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(dir)
    } else {
        None
    }
}

/// Serde adapter for binary payloads carried as base64 strings.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
