//! Evaluator configuration.

use kata_compiler::DEFAULT_FILE_NAME;
use kata_sandbox::{SandboxError, SandboxLimits};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::OutputMatch;

/// Errors loading or validating a [`KataConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    #[error(transparent)]
    InvalidLimits(#[from] SandboxError),
}

/// Everything a toolchain is built from. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KataConfig {
    /// Name diagnostics refer to.
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub limits: SandboxLimits,
    #[serde(default)]
    pub output_match: OutputMatch,
}

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_string()
}

impl Default for KataConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            limits: SandboxLimits::default(),
            output_match: OutputMatch::default(),
        }
    }
}

impl KataConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: KataConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_name.trim().is_empty() || self.file_name.contains(['\n', '\r']) {
            return Err(ConfigError::InvalidFileName(self.file_name.clone()));
        }
        self.limits.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let config = KataConfig::from_json("{}").unwrap();
        assert_eq!(config, KataConfig::default());
        assert_eq!(config.file_name, "main.ts");
        assert_eq!(config.output_match, OutputMatch::TrimTrailing);
    }

    #[test]
    fn test_partial_limits() {
        let config =
            KataConfig::from_json(r#"{"limits": {"gas_limit": 42}, "output_match": "exact"}"#)
                .unwrap();
        assert_eq!(config.limits.gas_limit, 42);
        assert_eq!(
            config.limits.max_output_bytes,
            SandboxLimits::default().max_output_bytes
        );
        assert_eq!(config.output_match, OutputMatch::Exact);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            KataConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            KataConfig::from_json(r#"{"output_match": "fuzzy"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            KataConfig::from_json(r#"{"file_name": "  "}"#),
            Err(ConfigError::InvalidFileName(_))
        ));
        assert!(matches!(
            KataConfig::from_json(r#"{"limits": {"gas_limit": 0}}"#),
            Err(ConfigError::InvalidLimits(_))
        ));
    }
}
