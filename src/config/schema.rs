//! Configuration schema definitions.
//!
//! This module defines the dev server's own settings. They are read once at
//! startup from an optional TOML file and overridden by CLI flags. The
//! project's `now.json` is modelled separately in [`crate::config::local`]
//! because it is re-read on every request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the dev server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Project layout (config file name, ignore patterns).
    pub project: ProjectConfig,

    /// Builder cache and installer settings.
    pub builders: BuildersConfig,

    /// Function runtime settings.
    pub runtime: RuntimeConfig,

    /// Server status policy.
    pub status: StatusConfig,

    /// File watcher settings.
    pub watcher: WatcherConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Project layout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Name of the deployment config file in the project root.
    pub config_file: String,

    /// Name of the gitignore-style ignore file in the project root.
    pub ignore_file: String,

    /// Extra ignore patterns (gitignore syntax).
    pub ignore: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            config_file: "now.json".to_string(),
            ignore_file: ".nowignore".to_string(),
            ignore: Vec::new(),
        }
    }
}

/// Builder cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildersConfig {
    /// Cache directory override. Defaults to the platform cache dir.
    pub cache_dir: Option<PathBuf>,

    /// Installer argv; the package name is appended.
    pub installer: Vec<String>,

    /// Node executable used by the builder and runtime bridges.
    pub node: String,

    /// Reserved pass-through builder that is never installed.
    pub static_builder: String,

    /// Packages installed alongside any non-static builder.
    pub support_packages: Vec<String>,

    /// Upper bound for a single entrypoint build, in seconds.
    pub build_timeout_secs: u64,
}

impl Default for BuildersConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            installer: vec![
                "npm".to_string(),
                "install".to_string(),
                "--prefer-offline".to_string(),
            ],
            node: "node".to_string(),
            static_builder: "@now/static".to_string(),
            support_packages: vec![
                "@now/build-utils".to_string(),
                "@zeit/fun".to_string(),
            ],
            build_timeout_secs: 600,
        }
    }
}

/// Function runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound for a single function invocation, in seconds.
    pub invoke_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            invoke_timeout_secs: 30,
        }
    }
}

/// Server status policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Keep the `error` status after a failed request until the next
    /// successful build, instead of resetting to `idle` right away.
    pub latch_errors: bool,
}

/// Project file watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Rebuild on file changes.
    pub enabled: bool,

    /// Quiet period before a burst of changes triggers a rebuild.
    pub debounce_ms: u64,

    /// Poll interval for platforms without native notifications.
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: 300,
            poll_interval_secs: 2,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Total time for a request, builds included, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body forwarded to a function, in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 900,
            max_body_size: 6 * 1024 * 1024, // 6MB, the platform's payload limit
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: DevConfig = toml::from_str(
            r#"
            [listener]
            port = 8080

            [status]
            latch_errors = true
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.listener.host, "0.0.0.0");
        assert!(config.status.latch_errors);
        assert_eq!(config.builders.static_builder, "@now/static");
        assert_eq!(config.project.config_file, "now.json");
    }

    #[test]
    fn test_bind_address() {
        let listener = ListenerConfig {
            host: "127.0.0.1".into(),
            port: 4000,
        };
        assert_eq!(listener.bind_address(), "127.0.0.1:4000");
    }
}
