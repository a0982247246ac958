//! Process configuration from `VARIA_*` environment variables

use crate::service::validation::parse_duration;
use crate::service::ServiceConfig;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default port for health and metrics endpoints
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

pub const DEFAULT_RESULTS_CACHE_TTL: &str = "5m";

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub health_port: u16,
    pub results_cache_ttl: Duration,
    pub default_page_size: usize,
    /// JSON snapshot to seed the store from at startup
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; unset and empty values take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let health_port = match get("VARIA_HEALTH_PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "VARIA_HEALTH_PORT",
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_HEALTH_PORT,
        };

        let ttl_value =
            get("VARIA_RESULTS_CACHE_TTL").unwrap_or_else(|| DEFAULT_RESULTS_CACHE_TTL.to_string());
        let results_cache_ttl =
            parse_duration(&ttl_value).ok_or_else(|| ConfigError::Invalid {
                name: "VARIA_RESULTS_CACHE_TTL",
                value: ttl_value.clone(),
                reason: "expected a duration like 30s, 5m or 1h".to_string(),
            })?;

        let default_page_size = match get("VARIA_DEFAULT_PAGE_SIZE") {
            Some(value) => match value.trim().parse::<usize>().map_err(|e| e.to_string()) {
                Ok(size) if (1..=crate::service::MAX_PAGE_SIZE).contains(&size) => size,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        name: "VARIA_DEFAULT_PAGE_SIZE",
                        value,
                        reason: format!("must be between 1 and {}", crate::service::MAX_PAGE_SIZE),
                    })
                }
                Err(reason) => {
                    return Err(ConfigError::Invalid {
                        name: "VARIA_DEFAULT_PAGE_SIZE",
                        value,
                        reason,
                    })
                }
            },
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(Config {
            health_port,
            results_cache_ttl,
            default_page_size,
            snapshot_path: get("VARIA_SNAPSHOT_PATH").map(PathBuf::from),
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            results_cache_ttl: self.results_cache_ttl,
            default_page_size: self.default_page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.results_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.snapshot_path, None);
        assert_eq!(config.service_config(), ServiceConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("VARIA_HEALTH_PORT", "9090"),
            ("VARIA_RESULTS_CACHE_TTL", "30s"),
            ("VARIA_DEFAULT_PAGE_SIZE", "50"),
            ("VARIA_SNAPSHOT_PATH", "/var/lib/varia/seed.json"),
        ]))
        .unwrap();
        assert_eq!(config.health_port, 9090);
        assert_eq!(config.results_cache_ttl, Duration::from_secs(30));
        assert_eq!(config.default_page_size, 50);
        assert_eq!(
            config.snapshot_path,
            Some(PathBuf::from("/var/lib/varia/seed.json"))
        );
    }

    #[test]
    fn test_empty_value_uses_default() {
        let config = Config::from_lookup(lookup(&[("VARIA_HEALTH_PORT", "")])).unwrap();
        assert_eq!(config.health_port, DEFAULT_HEALTH_PORT);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("VARIA_HEALTH_PORT", "http")])).unwrap_err();
        assert!(err.to_string().starts_with("VARIA_HEALTH_PORT"));

        let err = Config::from_lookup(lookup(&[("VARIA_RESULTS_CACHE_TTL", "5 minutes")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "VARIA_RESULTS_CACHE_TTL",
                ..
            }
        ));

        let err =
            Config::from_lookup(lookup(&[("VARIA_DEFAULT_PAGE_SIZE", "500")])).unwrap_err();
        assert!(err.to_string().contains("between 1 and 100"));
    }
}
