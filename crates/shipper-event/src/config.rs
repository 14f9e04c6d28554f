// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;

use serde::Deserialize;

use crate::constants::DEFAULT_MAX_PROCESSORS;

/// Errors raised while building a processing chain.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Processor chain has {count} processors, at most {max} are allowed")]
    TooManyProcessors { count: usize, max: usize },
}

/// What the chain does with an event when a processor fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the failure under the `error` field and keep processing.
    #[default]
    Annotate,
    /// Discard the event.
    Drop,
    /// Keep processing as if the failing step never ran.
    Ignore,
}

impl FromStr for ErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "annotate" => Ok(ErrorPolicy::Annotate),
            "drop" => Ok(ErrorPolicy::Drop),
            "ignore" => Ok(ErrorPolicy::Ignore),
            other => Err(ConfigError::InvalidConfig(format!(
                "Invalid processor error policy '{other}'. Must be one of: annotate, drop, ignore"
            ))),
        }
    }
}

/// Configuration of the processing chain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// How processor failures are handled
    pub error_policy: ErrorPolicy,
    /// Upper bound on the number of processors in one chain
    pub max_processors: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            max_processors: DEFAULT_MAX_PROCESSORS,
        }
    }
}

impl ProcessingConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let error_policy = match env::var("SHIPPER_PROCESSOR_ERROR_POLICY") {
            Ok(val) => val.parse::<ErrorPolicy>()?,
            Err(_) => ErrorPolicy::default(),
        };
        let max_processors = env::var("SHIPPER_MAX_PROCESSORS")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_PROCESSORS);

        let config = Self {
            error_policy,
            max_processors,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_processors == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_processors must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
