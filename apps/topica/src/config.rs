//! # Configuration
//!
//! Optional TOML settings for the CLI. Every field has a default, so an
//! empty file (or no file at all) is a valid configuration.
//!
//! ```toml
//! [ingest]
//! default_name_type = "http://psi.topicmaps.org/iso13250/model/topic-name"
//! max_depth = 64
//!
//! [limits]
//! max_file_size = 104857600
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use topica_core::primitives::MAX_STREAM_FILE_SIZE;
use topica_core::{IngestConfig, TopicMapError};

/// Top-level CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ingest: IngestConfig,
    pub limits: Limits,
}

/// Resource limits applied before any input is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Largest input file accepted, in bytes.
    pub max_file_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_STREAM_FILE_SIZE,
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, TopicMapError> {
        toml::from_str(text)
            .map_err(|e| TopicMapError::SerializationError(format!("Invalid config: {}", e)))
    }

    /// Load the configuration at `path`, or the defaults when no path is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self, TopicMapError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        tracing::debug!("Loading config from {:?}", path);
        let text = std::fs::read_to_string(path).map_err(|e| {
            TopicMapError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }
}

// =============================================================================
// TESTS
// =============================================================================
