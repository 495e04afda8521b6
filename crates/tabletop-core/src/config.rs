//! Engine configuration.
//!
//! Defaults, optional JSON, then `TABLETOP_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::entity::TemplateCatalog;
use crate::error::ConfigError;
use crate::grid::DEFAULT_CELL_SIZE;

pub const ENV_CELL_SIZE: &str = "TABLETOP_CELL_SIZE";
pub const ENV_DISCOVERY_URL: &str = "TABLETOP_DISCOVERY_URL";
pub const ENV_RECONNECT_ATTEMPTS: &str = "TABLETOP_RECONNECT_ATTEMPTS";

pub const DEFAULT_DISCOVERY_URL: &str = "http://localhost:5000/api/socket";
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 5000;

/// Bounded exponential backoff for reconnecting after a failure.
///
/// Off by default (`max_attempts == 0`): reconnecting is normally an
/// explicit decision of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before the given (zero-based) attempt: doubles each time, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let ms = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grid cell size in pixels. Fixed for the session.
    pub cell_size: u32,
    /// HTTP endpoint returning `{ "path": "<websocket url>" }`.
    pub discovery_url: String,
    /// Bound on the discovery request; the CLI also uses it for the
    /// websocket connect.
    pub discovery_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    pub templates: TemplateCatalog,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            discovery_url: DEFAULT_DISCOVERY_URL.to_string(),
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            reconnect: ReconnectPolicy::default(),
            templates: TemplateCatalog::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Apply `TABLETOP_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_CELL_SIZE) {
            self.cell_size = parse_value(ENV_CELL_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_DISCOVERY_URL) {
            self.discovery_url = value;
        }
        if let Some(value) = lookup(ENV_RECONNECT_ATTEMPTS) {
            self.reconnect.max_attempts = parse_value(ENV_RECONNECT_ATTEMPTS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_size == 0 {
            return Err(ConfigError::ZeroCellSize);
        }
        Ok(())
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cell_size, 50);
        assert_eq!(config.discovery_url, DEFAULT_DISCOVERY_URL);
        assert!(!config.reconnect.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"cell_size": 20}"#).unwrap();
        assert_eq!(config.cell_size, 20);
        assert_eq!(config.discovery_timeout_ms, DEFAULT_DISCOVERY_TIMEOUT_MS);
        assert_eq!(config.templates.len(), 4);
    }

    #[test]
    fn test_from_json_rejects_zero_cell() {
        let result = EngineConfig::from_json(r#"{"cell_size": 0}"#);
        assert!(matches!(result, Err(ConfigError::ZeroCellSize)));
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            EngineConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_templates_from_json() {
        let config = EngineConfig::from_json(
            r#"{"templates": [{"icon": "goblin", "kind": "token"}, {"icon": "stone", "kind": "floor"}]}"#,
        )
        .unwrap();
        assert_eq!(config.templates.len(), 2);
        assert_eq!(
            config.templates.kind_for_icon("stone"),
            crate::entity::EntityKind::Floor
        );
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CELL_SIZE, "32"),
            (ENV_DISCOVERY_URL, "http://example.test/api/socket"),
            (ENV_RECONNECT_ATTEMPTS, "3"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.cell_size, 32);
        assert_eq!(config.discovery_url, "http://example.test/api/socket");
        assert_eq!(config.reconnect.max_attempts, 3);
    }

    #[test]
    fn test_override_invalid_value() {
        let result = EngineConfig::default()
            .with_overrides_from(|k| (k == ENV_CELL_SIZE).then(|| "big".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(1000));
    }
}
