//! Package installer collaborator.
//!
//! The installer only signals success or failure; whether the package
//! actually landed is checked by the cache afterwards.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::builders::BuilderError;

/// Installs a package into a working directory.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install(&self, cwd: &Path, name: &str) -> Result<(), BuilderError>;
}

/// Runs an external installer command, e.g. `npm install --prefer-offline`.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    argv: Vec<String>,
}

impl CommandInstaller {
    /// `argv[0]` is the program; the package name is appended to the rest.
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl Default for CommandInstaller {
    fn default() -> Self {
        Self::new(vec![
            "npm".to_string(),
            "install".to_string(),
            "--prefer-offline".to_string(),
        ])
    }
}

#[async_trait]
impl PackageInstaller for CommandInstaller {
    async fn install(&self, cwd: &Path, name: &str) -> Result<(), BuilderError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(BuilderError::Install {
                name: name.to_string(),
                reason: "installer command is empty".to_string(),
            });
        };

        tracing::debug!(program = %program, package = %name, cwd = %cwd.display(), "Running installer");

        let output = Command::new(program)
            .args(args)
            .arg(name)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BuilderError::Install {
                name: name.to_string(),
                reason: format!("could not run {program}: {e}"),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(package = %name, stderr = %stderr, "Installer output");
        Err(BuilderError::Install {
            name: name.to_string(),
            reason: format!(
                "{program} exited with {}: {}",
                output.status.code().map_or("signal".to_string(), |c| c.to_string()),
                last_line(&stderr)
            ),
        })
    }
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}
