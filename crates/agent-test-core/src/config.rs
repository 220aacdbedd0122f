//! Configuration loader for agent-test.

use crate::assertion::AssertionConfig;
use crate::types::AgentTestConfig;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the scope directory.
pub const CONFIG_FILE_NAME: &str = "agent-test.config.yaml";

/// Errors that can occur during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },
    #[error("test-patterns cannot be empty")]
    NoTestPatterns,
}

/// Load configuration from `agent-test.config.yaml` in `dir`.
///
/// If the file doesn't exist, returns default configuration.
///
/// # Errors
/// Returns an error if:
/// - The file exists but cannot be read
/// - The YAML is invalid
/// - A threshold is outside `[0, 1]`
pub fn load_config(dir: &Path) -> Result<AgentTestConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    let config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        serde_yml::from_str(&content)?
    } else {
        AgentTestConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration.
///
/// # Errors
/// Returns `ConfigError::ThresholdOutOfRange` or `ConfigError::NoTestPatterns`.
pub fn validate_config(config: &AgentTestConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("similarity-threshold", config.similarity_threshold),
        ("grounding-threshold", config.grounding_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::ThresholdOutOfRange { name, value });
        }
    }
    if config.test_patterns.is_empty() {
        return Err(ConfigError::NoTestPatterns);
    }
    Ok(())
}

/// CLI override options for configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub suite_name: Option<String>,
    pub case_sensitive: Option<bool>,
    pub similarity_threshold: Option<f64>,
    pub grounding_threshold: Option<f64>,
}

/// Apply CLI overrides to a configuration.
#[must_use]
pub fn apply_overrides(
    mut config: AgentTestConfig,
    overrides: &ConfigOverrides,
) -> AgentTestConfig {
    if let Some(ref suite_name) = overrides.suite_name {
        config.suite_name = Some(suite_name.clone());
    }
    if let Some(case_sensitive) = overrides.case_sensitive {
        config.case_sensitive = case_sensitive;
    }
    if let Some(threshold) = overrides.similarity_threshold {
        config.similarity_threshold = threshold;
    }
    if let Some(threshold) = overrides.grounding_threshold {
        config.grounding_threshold = threshold;
    }
    config
}

impl AgentTestConfig {
    /// Assertion defaults derived from this configuration.
    #[must_use]
    pub fn assertion_config(&self) -> AssertionConfig {
        AssertionConfig {
            case_sensitive: self.case_sensitive,
            similarity_threshold: self.similarity_threshold,
            grounding_threshold: self.grounding_threshold,
            ..AssertionConfig::default()
        }
    }
}
