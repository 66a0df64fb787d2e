//! TOML configuration for the compiler and the command line.
//!
//! ```toml
//! phase = "full"
//!
//! [options]
//! strict = true
//! max-items = 50
//!
//! [logging]
//! level = "debug"
//! ```

use crate::core::error::ConfigurationError;
use crate::core::types::Parameters;
use crate::schematron::SchematronBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Logging section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `schematron=debug`
    pub level: Option<String>,
}

/// Settings read from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchematronConfig {
    /// Validation phase
    pub phase: Option<String>,
    /// Compiler options broadcast to every stage
    pub options: Parameters,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl SchematronConfig {
    /// Parse configuration text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::ConfigFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config = Self::from_toml(&text).map_err(|e| ConfigurationError::ConfigFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply the configured options and phase to a builder.
    pub fn apply(&self, builder: SchematronBuilder) -> SchematronBuilder {
        let builder = builder.options(&self.options);
        match &self.phase {
            Some(phase) => builder.phase(phase.as_str()),
            None => builder,
        }
    }
}
