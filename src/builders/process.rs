//! Subprocess boundary for JavaScript packages.
//!
//! Builder packages (and the function runtime) are node modules. They are
//! never loaded in-process; each call spawns `node -e <bridge>` with a JSON
//! request on stdin. The bridge writes a JSON envelope to `resultPath`,
//! leaving stdout and stderr free for the package's own logging.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::build::files::FileSet;
use crate::builders::{BuildInput, BuildOutput, Builder, BuilderError, BuilderLoader};

const BUILD_BRIDGE: &str = include_str!("bridge/build.js");

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge timed out after {0} seconds")]
    Timeout(u64),

    #[error("Bridge exited with {code} without a result: {stderr}")]
    Exited { code: String, stderr: String },

    #[error("Malformed bridge result: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("{message}")]
    Remote {
        message: String,
        stack: Option<String>,
    },
}

impl BridgeError {
    pub fn stack(&self) -> Option<&str> {
        match self {
            BridgeError::Remote { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

/// Error reported by the JavaScript side.
#[derive(Debug, Deserialize)]
struct RemoteError {
    message: String,
    #[serde(default)]
    stack: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Envelope<T> {
    Result(T),
    Error(RemoteError),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeRequest<'a, R> {
    #[serde(flatten)]
    request: &'a R,
    result_path: &'a Path,
}

/// Runs bridge scripts under a node executable.
#[derive(Debug, Clone)]
pub struct NodeBridge {
    node: String,
    timeout: Duration,
}

impl NodeBridge {
    pub fn new(node: impl Into<String>, timeout: Duration) -> Self {
        Self {
            node: node.into(),
            timeout,
        }
    }

    /// Run `script` with `request` and decode its result.
    pub async fn call<R, T>(&self, script: &str, request: &R) -> Result<T, BridgeError>
    where
        R: Serialize + Sync,
        T: DeserializeOwned,
    {
        let scratch = tempfile::tempdir()?;
        let result_path = scratch.path().join("result.json");
        let payload = serde_json::to_vec(&BridgeRequest {
            request,
            result_path: &result_path,
        })?;

        let mut child = Command::new(&self.node)
            .arg("-e")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: self.node.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BridgeError::Timeout(self.timeout.as_secs()))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            tracing::debug!(output = %stdout.trim_end(), "Bridge stdout");
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(output = %stderr.trim_end(), "Bridge stderr");
        }

        let content = match tokio::fs::read(&result_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BridgeError::Exited {
                    code: output.status.code().map_or("signal".to_string(), |c| c.to_string()),
                    stderr: stderr.trim().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Envelope<T>>(&content)? {
            Envelope::Result(result) => Ok(result),
            Envelope::Error(e) => Err(BridgeError::Remote {
                message: e.message,
                stack: e.stack,
            }),
        }
    }
}

/// Loads builders as bridge-backed subprocess builders.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    bridge: NodeBridge,
    cache_dir: PathBuf,
}

impl ProcessLoader {
    pub fn new(bridge: NodeBridge, cache_dir: PathBuf) -> Self {
        Self { bridge, cache_dir }
    }
}

impl BuilderLoader for ProcessLoader {
    fn load(&self, name: &str, package_dir: &Path) -> Result<Arc<dyn Builder>, BuilderError> {
        Ok(Arc::new(ProcessBuilder {
            name: name.to_string(),
            package_dir: package_dir.to_path_buf(),
            cache_dir: self.cache_dir.clone(),
            bridge: self.bridge.clone(),
        }))
    }
}

/// A builder package driven through the build bridge.
#[derive(Debug)]
pub struct ProcessBuilder {
    name: String,
    package_dir: PathBuf,
    cache_dir: PathBuf,
    bridge: NodeBridge,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildRequest<'a> {
    cache_dir: &'a Path,
    package_dir: &'a Path,
    files: &'a FileSet,
    entrypoint: &'a str,
    work_path: &'a Path,
    config: &'a serde_json::Value,
    output_dir: PathBuf,
}

impl ProcessBuilder {
    /// Spill directory for in-memory outputs of one entrypoint.
    fn output_dir(&self, entrypoint: &str) -> PathBuf {
        let slug: String = format!("{}/{}", self.name, entrypoint)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.cache_dir.join("outputs").join(slug)
    }
}

#[async_trait]
impl Builder for ProcessBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn build(&self, input: BuildInput<'_>) -> Result<BuildOutput, BuilderError> {
        let request = BuildRequest {
            cache_dir: &self.cache_dir,
            package_dir: &self.package_dir,
            files: input.files,
            entrypoint: input.entrypoint,
            work_path: input.work_path,
            config: input.config,
            output_dir: self.output_dir(input.entrypoint),
        };

        match self.bridge.call(BUILD_BRIDGE, &request).await {
            Ok(output) => Ok(output),
            Err(BridgeError::Remote { message, stack }) => Err(BuilderError::Failed { message, stack }),
            Err(e) => Err(e.into()),
        }
    }
}
