//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, commands non-empty)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DevConfig → Result<(), Vec<ValidationError>>
//! - The project's `now.json` is checked per request by the dispatcher, not here

use std::fmt;

use crate::config::schema::DevConfig;

/// A single semantic problem in the dev server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check the settings for values that would only fail later at runtime.
pub fn validate_config(config: &DevConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.builders.installer.is_empty() {
        errors.push(ValidationError::new("builders.installer", "installer command is empty"));
    }
    if config.builders.node.trim().is_empty() {
        errors.push(ValidationError::new("builders.node", "node executable is empty"));
    }
    if config.builders.static_builder.is_empty() {
        errors.push(ValidationError::new("builders.static_builder", "must name a builder"));
    }
    if config.builders.build_timeout_secs == 0 {
        errors.push(ValidationError::new("builders.build_timeout_secs", "must be greater than 0"));
    }
    if config.runtime.invoke_timeout_secs == 0 {
        errors.push(ValidationError::new("runtime.invoke_timeout_secs", "must be greater than 0"));
    }
    if config.limits.request_timeout_secs == 0 {
        errors.push(ValidationError::new("limits.request_timeout_secs", "must be greater than 0"));
    }
    if config.watcher.enabled && config.watcher.debounce_ms == 0 {
        errors.push(ValidationError::new("watcher.debounce_ms", "must be greater than 0"));
    }
    if config.project.config_file.is_empty() {
        errors.push(ValidationError::new("project.config_file", "must name a file"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&DevConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = DevConfig::default();
        config.builders.build_timeout_secs = 0;
        config.runtime.invoke_timeout_secs = 0;
        config.watcher.enabled = true;
        config.watcher.debounce_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            ["builders.build_timeout_secs", "runtime.invoke_timeout_secs", "watcher.debounce_ms"]
        );
    }
}
