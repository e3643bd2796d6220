use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::types::ChainId;

pub const DEFAULT_TOKEN_BALANCE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Prefix of the environment variables overriding a chain's RPC URL,
/// e.g. `BALANCE_RPC_137`.
pub const RPC_ENV_PREFIX: &str = "BALANCE_RPC_";

/// Configuration for all supported chains and the balance cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// Configuration for a single chain
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    #[serde(rename = "chainId")]
    pub chain_id: ChainId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub rpc: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Go-style duration string such as `"24h"` or `"1h30m"`.
    #[serde(rename = "tokenBalanceTtl", default)]
    pub token_balance_ttl: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    #[serde(rename = "requestTimeout", default)]
    pub request_timeout: String,
    #[serde(rename = "batchConcurrency", default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout: String::new(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl Config {
    /// Load the embedded default configuration, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_str = include_str!("../config.json");
        let mut config = Self::from_json(config_str)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_json(&config_str)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_json(config_str: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            bail!("no chains configured");
        }
        for (key, chain) in &self.chains {
            if chain.rpc.trim().is_empty() {
                bail!("chain '{key}' has an empty rpc url");
            }
        }
        Ok(())
    }

    /// Replace RPC URLs from `BALANCE_RPC_<chainId>` variables when set.
    pub fn apply_env_overrides(&mut self) {
        for chain in self.chains.values_mut() {
            let var = format!("{RPC_ENV_PREFIX}{}", chain.chain_id);
            if let Ok(url) = std::env::var(&var) {
                if !url.trim().is_empty() {
                    chain.rpc = url;
                }
            }
        }
    }

    /// Get a specific chain configuration
    pub fn get_chain(&self, key: &str) -> Option<&ChainConfig> {
        self.chains.get(key)
    }

    pub fn chain_by_id(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.values().find(|chain| chain.chain_id == chain_id)
    }

    /// Cache TTL. Malformed or zero values fall back to 24 hours.
    pub fn token_balance_ttl(&self) -> Duration {
        let raw = &self.cache.token_balance_ttl;
        match parse_duration(raw) {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => {
                warn!(
                    value = %raw,
                    "invalid cache.tokenBalanceTtl, using default of {:?}",
                    DEFAULT_TOKEN_BALANCE_TTL
                );
                DEFAULT_TOKEN_BALANCE_TTL
            }
        }
    }

    /// Upper bound for a single RPC call. Malformed or zero values fall back to 10 seconds.
    pub fn request_timeout(&self) -> Duration {
        let raw = &self.rpc.request_timeout;
        match parse_duration(raw) {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => {
                if !raw.is_empty() {
                    warn!(value = %raw, "invalid rpc.requestTimeout, using default");
                }
                DEFAULT_REQUEST_TIMEOUT
            }
        }
    }

    pub fn batch_concurrency(&self) -> usize {
        self.rpc.batch_concurrency.max(1)
    }
}

/// Parse a duration in Go's notation: a sequence of decimal numbers with a
/// unit suffix (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`), e.g. `"1h30m"` or `"1.5s"`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        nanos += value * unit_nanos;
        rest = &rest[unit_len..];
    }

    Some(Duration::from_nanos(nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let config = Config::load().unwrap();
        assert_eq!(config.chains.len(), 3);
        assert!(config.chain_by_id(1).is_some());
        assert!(config.chain_by_id(56).is_some());
        assert!(config.chain_by_id(137).is_some());
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::load().unwrap();
        assert_eq!(config.token_balance_ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.batch_concurrency(), 8);
        assert_eq!(config.get_chain("polygon").unwrap().chain_id, 137);
    }

    #[test]
    fn test_malformed_ttl_falls_back_to_default() {
        let config = Config::from_json(
            r#"{
                "chains": { "ethereum": { "chainId": 1, "rpc": "http://localhost:8545" } },
                "cache": { "tokenBalanceTtl": "one day" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.token_balance_ttl(), DEFAULT_TOKEN_BALANCE_TTL);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = Config::from_json(
            r#"{ "chains": { "ethereum": { "chainId": 1, "rpc": "http://localhost:8545" } } }"#,
        )
        .unwrap();
        assert_eq!(config.token_balance_ttl(), DEFAULT_TOKEN_BALANCE_TTL);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.batch_concurrency(), DEFAULT_BATCH_CONCURRENCY);
    }

    #[test]
    fn test_custom_ttl_and_timeout() {
        let config = Config::from_json(
            r#"{
                "chains": { "bsc": { "chainId": 56, "rpc": "http://localhost:8545" } },
                "cache": { "tokenBalanceTtl": "1h30m" },
                "rpc": { "requestTimeout": "2.5s", "batchConcurrency": 0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.token_balance_ttl(), Duration::from_secs(5400));
        assert_eq!(config.request_timeout(), Duration::from_millis(2500));
        assert_eq!(config.batch_concurrency(), 1);
    }

    #[test]
    fn test_rejects_empty_chain_set_and_blank_rpc() {
        assert!(Config::from_json(r#"{ "chains": {} }"#).is_err());
        assert!(Config::from_json(r#"{ "chains": { "x": { "chainId": 1, "rpc": " " } } }"#).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("1h15m30s"), Some(Duration::from_secs(4530)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("-1h"), None);
        assert_eq!(parse_duration("3d"), None);
    }
}
