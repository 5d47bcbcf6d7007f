//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::identity::is_simple_identifier;
use crate::{ConfigError, TrellisError, TrellisResult};

/// Read/write consistency level passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    #[default]
    LocalQuorum,
    EachQuorum,
    LocalOne,
    Serial,
    LocalSerial,
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    /// Contact points
    pub hosts: Vec<String>,
    pub port: u16,
    /// Keyspace used when a document does not name one
    pub default_keyspace: Option<String>,
    pub consistency: Consistency,
    /// Per-request timeout, passed through to the backend
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    pub migrations_dir: PathBuf,
    /// Bookkeeping table for applied migrations
    pub migrations_table: String,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            port: 9042,
            default_keyspace: None,
            consistency: Consistency::LocalQuorum,
            request_timeout: Duration::from_secs(12),
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "schema_migrations".to_string(),
        }
    }
}

impl TrellisConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TRELLIS_HOSTS`: comma-separated contact points (default: 127.0.0.1)
    /// - `TRELLIS_PORT`: native protocol port (default: 9042)
    /// - `TRELLIS_KEYSPACE`: default keyspace (default: none)
    /// - `TRELLIS_REQUEST_TIMEOUT_MS`: request timeout (default: 12000)
    /// - `TRELLIS_MIGRATIONS_DIR`: migration directory (default: migrations)
    /// - `TRELLIS_MIGRATIONS_TABLE`: bookkeeping table (default: schema_migrations)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            hosts: std::env::var("TRELLIS_HOSTS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|h| h.trim().to_string())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.hosts),
            port: std::env::var("TRELLIS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            default_keyspace: std::env::var("TRELLIS_KEYSPACE")
                .ok()
                .or(defaults.default_keyspace),
            consistency: defaults.consistency,
            request_timeout: std::env::var("TRELLIS_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            migrations_dir: std::env::var("TRELLIS_MIGRATIONS_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.migrations_dir),
            migrations_table: std::env::var("TRELLIS_MIGRATIONS_TABLE")
                .ok()
                .unwrap_or(defaults.migrations_table),
        }
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> TrellisResult<Self> {
        toml::from_str(source).map_err(|e| {
            TrellisError::Config(ConfigError::InvalidValue {
                field: "<toml>".to_string(),
                value: String::new(),
                reason: e.to_string(),
            })
        })
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - at least one host
    /// - port > 0
    /// - request_timeout > 0
    /// - keyspace and bookkeeping table are plain identifiers
    pub fn validate(&self) -> TrellisResult<()> {
        if self.hosts.is_empty() {
            return Err(TrellisError::Config(ConfigError::MissingRequired {
                field: "hosts".to_string(),
            }));
        }

        if self.port == 0 {
            return Err(TrellisError::Config(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: self.port.to_string(),
                reason: "port must be greater than 0".to_string(),
            }));
        }

        if self.request_timeout.is_zero() {
            return Err(TrellisError::Config(ConfigError::InvalidValue {
                field: "request_timeout".to_string(),
                value: format!("{:?}", self.request_timeout),
                reason: "request_timeout must be positive".to_string(),
            }));
        }

        if let Some(keyspace) = &self.default_keyspace {
            if !is_simple_identifier(keyspace) {
                return Err(TrellisError::Config(ConfigError::InvalidValue {
                    field: "default_keyspace".to_string(),
                    value: keyspace.clone(),
                    reason: "keyspace must be a lowercase identifier".to_string(),
                }));
            }
        }

        if !is_simple_identifier(&self.migrations_table) {
            return Err(TrellisError::Config(ConfigError::InvalidValue {
                field: "migrations_table".to_string(),
                value: self.migrations_table.clone(),
                reason: "table must be a lowercase identifier".to_string(),
            }));
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
