use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::services::registry::RegistryConfig;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const ENV_PREFIX: &str = "SERVICE_REGISTRY_";

/// 配置加载错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid environment override: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// 心跳超时（秒）
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// 清理间隔（秒），缺省为 TTL 的一半
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    /// 事件广播通道容量
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    RegistryConfig::DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

// 环境变量覆盖项，均为可选
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    event_channel_capacity: Option<usize>,
}

impl Config {
    /// 从 config.toml 加载，文件不存在时使用默认配置，然后应用环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::from_path(DEFAULT_CONFIG_PATH) {
            Ok(config) => config,
            Err(ConfigError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Self::default()
            }
            Err(err) => return Err(err),
        };
        config.apply_overrides(std::env::vars())?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    /// 应用 `SERVICE_REGISTRY_` 前缀的覆盖项
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_iter(vars)?;

        if let Some(ttl_secs) = overrides.ttl_secs {
            self.registry.ttl_secs = ttl_secs;
        }
        if overrides.sweep_interval_secs.is_some() {
            self.registry.sweep_interval_secs = overrides.sweep_interval_secs;
        }
        if let Some(capacity) = overrides.event_channel_capacity {
            self.registry.event_channel_capacity = capacity;
        }
        Ok(())
    }

    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let settings = &self.registry;
        let mut config = RegistryConfig::new(Duration::from_secs(settings.ttl_secs))
            .with_event_channel_capacity(settings.event_channel_capacity);
        if let Some(secs) = settings.sweep_interval_secs {
            config = config.with_sweep_interval(Duration::from_secs(secs));
        }

        config
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            [registry]
            ttl_secs = 10
            sweep_interval_secs = 3
            event_channel_capacity = 64
            "#,
        )
        .expect("config should parse");

        let registry = config.registry_config().expect("config should be valid");
        assert_eq!(registry.ttl, Duration::from_secs(10));
        assert_eq!(registry.sweep_interval, Duration::from_secs(3));
        assert_eq!(registry.event_channel_capacity, 64);
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let config = Config::from_toml_str("").expect("empty config should parse");
        let registry = config.registry_config().expect("defaults should be valid");

        assert_eq!(registry.ttl, Duration::from_secs(60));
        assert_eq!(registry.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(vars(&[
                ("SERVICE_REGISTRY_TTL_SECS", "4"),
                ("SERVICE_REGISTRY_SWEEP_INTERVAL_SECS", "1"),
                ("UNRELATED_VAR", "ignored"),
            ]))
            .expect("overrides should apply");

        assert_eq!(config.registry.ttl_secs, 4);
        assert_eq!(config.registry.sweep_interval_secs, Some(1));
        assert_eq!(
            config.registry.event_channel_capacity,
            RegistryConfig::DEFAULT_EVENT_CHANNEL_CAPACITY
        );
    }

    #[test]
    fn test_invalid_env_override_is_reported() {
        let mut config = Config::default();
        let result = config.apply_overrides(vars(&[("SERVICE_REGISTRY_TTL_SECS", "soon")]));
        assert!(matches!(result, Err(ConfigError::Env(_))));
    }

    #[test]
    fn test_sweep_longer_than_ttl_is_invalid() {
        let config = Config::from_toml_str(
            r#"
            [registry]
            ttl_secs = 2
            sweep_interval_secs = 5
            "#,
        )
        .expect("config should parse");

        assert!(matches!(config.registry_config(), Err(ConfigError::Invalid(_))));
    }
}
