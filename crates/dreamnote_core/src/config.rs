//! Core runtime configuration.
//!
//! # Responsibility
//! - Collect tunables the host passes to core at startup.
//! - Provide defaults for every field so partial JSON documents load.
//!
//! # Invariants
//! - Graph thresholds are finite and strictly positive.
//! - `device_id` is non-empty; it scopes device-local flags.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_DEVICE_ID: &str = "local-device";
const DEFAULT_DB_FILE_NAME: &str = "dreamnote.sqlite3";

/// Thresholds used by the thought graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Same-emotion nodes closer than this get an automatic bond.
    pub bond_distance: f64,
    /// Drag-release merges when `distance < (size_a + size_b) / divisor`.
    pub merge_proximity_divisor: f64,
    /// Distance at which an automatic bond's strength reaches zero.
    pub bond_fade_distance: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            bond_distance: 400.0,
            merge_proximity_divisor: 2.5,
            bond_fade_distance: 600.0,
        }
    }
}

/// Host-provided configuration for one core instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub log_level: String,
    /// Absolute log directory; logging stays off when `None`.
    pub log_dir: Option<String>,
    pub db_path: String,
    pub device_id: String,
    pub graph: GraphConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            db_path: DEFAULT_DB_FILE_NAME.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            graph: GraphConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "config is not valid JSON: {err}"),
            Self::Invalid { field, reason } => write!(f, "config field `{field}` {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "device_id",
                reason: "cannot be empty".to_string(),
            });
        }
        if self.db_path.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "db_path",
                reason: "cannot be empty".to_string(),
            });
        }
        for (field, value) in [
            ("graph.bond_distance", self.graph.bond_distance),
            ("graph.merge_proximity_divisor", self.graph.merge_proximity_divisor),
            ("graph.bond_fade_distance", self.graph.bond_fade_distance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be finite and positive, got {value}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, GraphConfig};

    #[test]
    fn partial_document_keeps_defaults() {
        let config = CoreConfig::from_json_str(
            r#"{"device_id":"phone","graph":{"bond_distance":250.0}}"#,
        )
        .expect("partial config should load");
        assert_eq!(config.device_id, "phone");
        assert_eq!(config.graph.bond_distance, 250.0);
        assert_eq!(
            config.graph.merge_proximity_divisor,
            GraphConfig::default().merge_proximity_divisor
        );
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn rejects_non_positive_thresholds() {
        let err = CoreConfig::from_json_str(r#"{"graph":{"merge_proximity_divisor":0}}"#)
            .expect_err("zero divisor must be rejected");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "graph.merge_proximity_divisor",
                ..
            }
        ));
    }

    #[test]
    fn rejects_blank_device_id() {
        let err = CoreConfig::from_json_str(r#"{"device_id":"  "}"#).expect_err("blank id");
        assert!(err.to_string().contains("device_id"));
    }
}
