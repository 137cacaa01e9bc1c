//! Engine configuration.
//!
//! ```
//! use fable_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "world": { "instance_separator": "~" } }"#).unwrap();
//! assert_eq!(config.world.instance_separator, "~");
//! assert_eq!(config.log_filter, "warn");
//! ```

use fable_core::world::WorldConfig;
use serde::{Deserialize, Serialize};

/// Log filter used when neither the config nor `FABLE_LOG` sets one.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Errors from loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid instance separator {separator:?}: {reason}")]
    InvalidSeparator {
        separator: String,
        reason: &'static str,
    },

    #[error("provenance prefix must not be empty")]
    EmptyProvenancePrefix,
}

/// Settings for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub world: WorldConfig,
    /// `tracing_subscriber::EnvFilter` directive; `FABLE_LOG` overrides it.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that would make instance ids or event names ambiguous.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let separator = &self.world.instance_separator;
        let reason = if separator.is_empty() {
            Some("must not be empty")
        } else if separator.contains('.') {
            Some("must not contain '.', the event name separator")
        } else if separator.contains('*') {
            Some("must not contain '*', the wildcard character")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ConfigError::InvalidSeparator {
                separator: separator.clone(),
                reason,
            });
        }
        if self.world.provenance_prefix.is_empty() {
            return Err(ConfigError::EmptyProvenancePrefix);
        }
        Ok(())
    }
}
