mod cache;
mod chain;
mod config;
mod ethereum;
#[cfg(feature = "redis")]
mod redis_cache;
mod registry;
mod resolver;
mod types;

pub use cache::{BalanceCache, CacheError, MemoryBalanceCache};
pub use chain::{ChainClient, ChainError};
pub use config::{parse_duration, CacheConfig, ChainConfig, Config, RpcConfig};
pub use ethereum::EvmChainClient;
#[cfg(feature = "redis")]
pub use redis_cache::RedisBalanceCache;
pub use registry::{ChainRegistry, ChainRegistryBuilder};
pub use resolver::{BalanceResolver, Resolution, ResolveError, ResolverSettings};
pub use types::{
    chain_name, format_units, BalanceRecord, BalanceResponse, ChainId, TokenMetadata,
    TokenReference, WalletReference,
};

use std::sync::Arc;

use anyhow::Result;

/// Build a resolver with one EVM client per configured chain on top of `cache`.
pub fn resolver_from_config(config: &Config, cache: Arc<dyn BalanceCache>) -> Result<BalanceResolver> {
    let registry = ChainRegistry::from_config(config)?;
    Ok(BalanceResolver::new(
        Arc::new(registry),
        cache,
        ResolverSettings::from_config(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_loads() {
        let config = Config::load();
        assert!(config.is_ok());
    }

    #[test]
    fn test_resolver_from_default_config() {
        let config = Config::load().unwrap();
        let resolver = resolver_from_config(&config, Arc::new(MemoryBalanceCache::new())).unwrap();
        assert_eq!(resolver.settings().cache_ttl, config.token_balance_ttl());
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_get_mainnet_usdc_balance() {
        let config = Config::load().unwrap();
        let resolver = resolver_from_config(&config, Arc::new(MemoryBalanceCache::new())).unwrap();
        let wallets = vec![WalletReference::new(1, "0x28C6c06298d514Db089934071355E5743bf21d60")
            .with_token(TokenReference::new(1, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))];

        let balances = resolver.resolve_many(&wallets, true).await;
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].symbol, "USDC");
    }
}
