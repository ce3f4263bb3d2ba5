//! Build orchestration.
//!
//! # Responsibilities
//! - Install and load every builder a config needs, before building anything
//! - Expand each build spec's glob against the project's file set
//! - Run builders per entrypoint and merge outputs into one [`AssetMap`]
//!
//! # Design Decisions
//! - All-or-nothing: the first failing entrypoint aborts the cycle
//! - Merge is last-write-wins in declared build order
//! - The static builder is handled in-process and never installed

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glob::{MatchOptions, Pattern, PatternError};
use thiserror::Error;

use crate::build::assets::{Asset, AssetMap};
use crate::build::files::{collect_project_files, FileSet, FilesError, IgnoreList};
use crate::builders::{BuildInput, Builder, BuilderCache, BuilderError};
use crate::config::local::BuildSpec;
use crate::config::schema::{BuildersConfig, ProjectConfig};
use crate::observability::metrics;

/// Entrypoint globs follow shell rules: `*` never crosses a `/`.
const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Error)]
pub enum BuildError {
    /// Installing or loading a builder failed; nothing was built.
    #[error(transparent)]
    Builder(#[from] BuilderError),

    /// A builder failed on one entrypoint.
    #[error("Failed building {} with {}", .spec.src, .builder)]
    Failure {
        spec: BuildSpec,
        builder: String,
        #[source]
        source: BuilderError,
    },

    #[error("Invalid build source glob `{src}`: {source}")]
    Pattern {
        src: String,
        #[source]
        source: PatternError,
    },

    #[error("Build of {entrypoint} timed out after {secs} seconds")]
    Timeout { entrypoint: String, secs: u64 },

    #[error(transparent)]
    Files(#[from] FilesError),
}

impl BuildError {
    /// The build spec that failed, if the failure belongs to one.
    pub fn spec(&self) -> Option<&BuildSpec> {
        match self {
            BuildError::Failure { spec, .. } => Some(spec),
            _ => None,
        }
    }

    pub fn stack(&self) -> Option<&str> {
        match self {
            BuildError::Builder(e) | BuildError::Failure { source: e, .. } => e.stack(),
            _ => None,
        }
    }
}

/// Turns build specs into an asset map.
#[derive(Debug)]
pub struct Orchestrator {
    cache: Arc<BuilderCache>,
    builders: BuildersConfig,
    project: ProjectConfig,
}

impl Orchestrator {
    pub fn new(cache: Arc<BuilderCache>, builders: BuildersConfig, project: ProjectConfig) -> Self {
        Self {
            cache,
            builders,
            project,
        }
    }

    /// Ignore list for `root`, including the builder cache when nested in it.
    pub fn ignore_list(&self, root: &Path) -> Result<IgnoreList, FilesError> {
        IgnoreList::for_project(root, &self.project, Some(self.cache.dir()))
    }

    fn is_static(&self, builder: &str) -> bool {
        builder == self.builders.static_builder
    }

    /// Packages a config needs, in first-use order, support packages last.
    pub fn required_packages(&self, specs: &[BuildSpec]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut packages: Vec<String> = specs
            .iter()
            .map(|spec| spec.builder.as_str())
            .filter(|name| !self.is_static(name))
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect();

        if !packages.is_empty() {
            for support in &self.builders.support_packages {
                if !packages.contains(support) {
                    packages.push(support.clone());
                }
            }
        }
        packages
    }

    /// Install and load every builder the specs reference.
    async fn prepare_builders(
        &self,
        specs: &[BuildSpec],
    ) -> Result<HashMap<String, Arc<dyn Builder>>, BuilderError> {
        let mut loaded = HashMap::new();
        for package in self.required_packages(specs) {
            self.cache.ensure_installed(&package).await?;
        }
        for spec in specs.iter().filter(|spec| !self.is_static(&spec.builder)) {
            if !loaded.contains_key(&spec.builder) {
                let builder = self.cache.load(&spec.builder)?;
                loaded.insert(spec.builder.clone(), builder);
            }
        }
        Ok(loaded)
    }

    /// Run one full build cycle.
    ///
    /// On error nothing is returned, so the caller keeps its last map.
    pub async fn build_project(&self, specs: &[BuildSpec], root: &Path) -> Result<AssetMap, BuildError> {
        let started = Instant::now();
        let result = self.run_cycle(specs, root).await;
        metrics::record_build(if result.is_ok() { "success" } else { "failure" }, started);

        if let Ok(assets) = &result {
            tracing::debug!(
                count = assets.len(),
                keys = ?assets.keys().collect::<Vec<_>>(),
                "Build outputs"
            );
        }
        result
    }

    async fn run_cycle(&self, specs: &[BuildSpec], root: &Path) -> Result<AssetMap, BuildError> {
        let builders = self.prepare_builders(specs).await?;
        let files = collect_project_files(root, &self.ignore_list(root)?).await?;

        let mut assets = AssetMap::new();
        for spec in specs {
            let entrypoints = expand_entrypoints(spec, &files)?;
            tracing::info!(src = %spec.src, builder = %spec.builder, entrypoints = entrypoints.len(), "Build");

            if self.is_static(&spec.builder) {
                for entrypoint in entrypoints {
                    if let Some(file) = files.get(entrypoint) {
                        assets.insert(entrypoint, Asset::StaticFile(file.clone()));
                    }
                }
                continue;
            }

            let Some(builder) = builders.get(&spec.builder) else {
                return Err(BuilderError::NotFound {
                    name: spec.builder.clone(),
                    path: self.cache.package_dir(&spec.builder),
                }
                .into());
            };

            for entrypoint in entrypoints {
                let input = BuildInput {
                    files: &files,
                    entrypoint,
                    work_path: root,
                    config: &spec.config,
                };
                let output = self
                    .build_entrypoint(builder.as_ref(), input)
                    .await
                    .map_err(|e| match e {
                        EntrypointError::Builder(source) => BuildError::Failure {
                            spec: spec.clone(),
                            builder: spec.builder.clone(),
                            source,
                        },
                        EntrypointError::Timeout(secs) => BuildError::Timeout {
                            entrypoint: entrypoint.to_string(),
                            secs,
                        },
                    })?;
                assets.extend(output.outputs);
            }
        }
        Ok(assets)
    }

    async fn build_entrypoint(
        &self,
        builder: &dyn Builder,
        input: BuildInput<'_>,
    ) -> Result<crate::builders::BuildOutput, EntrypointError> {
        tracing::info!(entrypoint = %input.entrypoint, builder = %builder.name(), "Building entrypoint");
        let secs = self.builders.build_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), builder.build(input)).await {
            Ok(result) => result.map_err(EntrypointError::Builder),
            Err(_) => Err(EntrypointError::Timeout(secs)),
        }
    }
}

enum EntrypointError {
    Builder(BuilderError),
    Timeout(u64),
}

/// Entrypoints matched by a spec's glob, in file set order.
fn expand_entrypoints<'f>(spec: &BuildSpec, files: &'f FileSet) -> Result<Vec<&'f str>, BuildError> {
    let src = spec.src.trim_start_matches('/');
    let pattern = Pattern::new(src).map_err(|source| BuildError::Pattern {
        src: spec.src.clone(),
        source,
    })?;
    Ok(files
        .keys()
        .map(String::as_str)
        .filter(|key| pattern.matches_with(key, GLOB_OPTIONS))
        .collect())
}
