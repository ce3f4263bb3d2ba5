//! Project file collection.
//!
//! # Responsibilities
//! - Walk the project directory into an ordered [`FileSet`]
//! - Skip version control, dependency and cache directories
//! - Honour `.nowignore` and configured gitignore-style patterns

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::schema::ProjectConfig;

/// Entries that are never part of a deployment.
const DEFAULT_IGNORES: &[&str] = &[".git", ".hg", ".svn", ".DS_Store", "node_modules"];

/// Reference to a file on disk plus the metadata builders need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub fs_path: PathBuf,
    pub mode: u32,
}

/// Project-relative path (always `/`-separated) to file reference.
pub type FileSet = BTreeMap<String, FileRef>;

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("Failed to walk project directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid ignore pattern: {0}")]
    Ignore(#[from] ignore::Error),

    #[error("File collection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Compiled ignore list for one project.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    matcher: Arc<Gitignore>,
}

impl IgnoreList {
    /// Build the ignore list for `root`.
    ///
    /// `cache_dir` is excluded too when it lives inside the project.
    pub fn for_project(
        root: &Path,
        project: &ProjectConfig,
        cache_dir: Option<&Path>,
    ) -> Result<Self, FilesError> {
        let mut builder = GitignoreBuilder::new(root);

        for pattern in DEFAULT_IGNORES {
            builder.add_line(None, pattern)?;
        }
        for pattern in &project.ignore {
            builder.add_line(None, pattern)?;
        }

        let ignore_file = root.join(&project.ignore_file);
        if ignore_file.is_file() {
            if let Some(e) = builder.add(&ignore_file) {
                tracing::warn!(path = %ignore_file.display(), error = %e, "Ignore file partially parsed");
            }
        }

        if let Some(rel) = cache_dir.and_then(|dir| dir.strip_prefix(root).ok()) {
            if !rel.as_os_str().is_empty() {
                builder.add_line(None, &format!("/{}", to_key(rel)))?;
            }
        }

        Ok(Self {
            matcher: Arc::new(builder.build()?),
        })
    }

    /// Whether a project-relative path (or any of its parents) is ignored.
    pub fn ignores(&self, rel_path: &str, is_dir: bool) -> bool {
        let rel_path = rel_path.trim_start_matches('/');
        if rel_path.is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }
}

/// Convert a relative path into a `/`-separated file set key.
pub fn to_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` and collect every non-ignored regular file.
pub async fn collect_project_files(root: &Path, ignore: &IgnoreList) -> Result<FileSet, FilesError> {
    let root = root.to_path_buf();
    let ignore = ignore.clone();

    let files = tokio::task::spawn_blocking(move || walk(&root, &ignore)).await??;
    tracing::debug!(count = files.len(), "Collected project files");
    Ok(files)
}

fn walk(root: &Path, ignore: &IgnoreList) -> Result<FileSet, FilesError> {
    let mut files = FileSet::new();

    let entries = WalkDir::new(root).follow_links(true).into_iter().filter_entry(|entry| {
        match entry.path().strip_prefix(root) {
            Ok(rel) => !ignore.ignores(&to_key(rel), entry.file_type().is_dir()),
            Err(_) => true,
        }
    });

    for entry in entries {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let metadata = entry.metadata()?;
        files.insert(
            to_key(rel),
            FileRef {
                fs_path: entry.path().to_path_buf(),
                mode: file_mode(&metadata),
            },
        );
    }

    Ok(files)
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o100444
    } else {
        0o100644
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("api")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("node_modules/left-pad")).unwrap();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(root.join("api/date.js"), "module.exports = 1").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join("node_modules/left-pad/index.js"), "").unwrap();
        fs::write(root.join("drafts/post.md"), "wip").unwrap();
        fs::write(root.join("secret.env"), "KEY=1").unwrap();
        fs::write(root.join(".nowignore"), "drafts\n*.env\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_collect_skips_ignored_entries() {
        let dir = project();
        let ignore = IgnoreList::for_project(dir.path(), &ProjectConfig::default(), None).unwrap();

        let files = collect_project_files(dir.path(), &ignore).await.unwrap();
        let keys: Vec<_> = files.keys().map(String::as_str).collect();

        assert_eq!(keys, [".nowignore", "api/date.js", "index.html"]);
        assert_eq!(files["api/date.js"].fs_path, dir.path().join("api/date.js"));
    }

    #[tokio::test]
    async fn test_cache_dir_inside_project_is_ignored() {
        let dir = project();
        let cache = dir.path().join(".builders");
        fs::create_dir_all(cache.join("node_modules/@now/node")).unwrap();
        fs::write(cache.join("package.json"), "{\"private\":true}").unwrap();

        let ignore = IgnoreList::for_project(dir.path(), &ProjectConfig::default(), Some(&cache)).unwrap();
        let files = collect_project_files(dir.path(), &ignore).await.unwrap();

        assert!(files.keys().all(|k| !k.starts_with(".builders")));
        assert!(ignore.ignores("/.builders/package.json", false));
    }

    #[test]
    fn test_configured_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectConfig {
            ignore: vec!["*.log".into()],
            ..ProjectConfig::default()
        };
        let ignore = IgnoreList::for_project(dir.path(), &project, None).unwrap();

        assert!(ignore.ignores("logs/server.log", false));
        assert!(ignore.ignores(".git/config", false));
        assert!(!ignore.ignores("index.html", false));
        assert!(!ignore.ignores("/", true));
    }
}
