//! Cache-first balance resolution across chains.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{BalanceCache, CacheError};
use crate::chain::ChainError;
use crate::config::{Config, DEFAULT_BATCH_CONCURRENCY, DEFAULT_TOKEN_BALANCE_TTL};
use crate::registry::ChainRegistry;
use crate::types::{BalanceRecord, BalanceResponse, ChainId, WalletReference};

/// Why a single (wallet, token) pair could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unsupported chain ID: {0}")]
    UnsupportedChain(ChainId),

    /// Connectivity, timeout or contract-call failure on the chain endpoint.
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl From<ChainError> for ResolveError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Decode(msg) => ResolveError::Decode(msg),
            ChainError::InvalidAddress(address) => ResolveError::InvalidAddress(address),
            other @ (ChainError::Transport(_)
            | ChainError::ContractCall(_)
            | ChainError::Timeout(_)) => ResolveError::Rpc(other.to_string()),
        }
    }
}

/// Outcome for one (wallet, token) pair of a batch.
#[derive(Debug)]
pub enum Resolution {
    Resolved(BalanceRecord),
    Skipped {
        wallet: String,
        token: String,
        chain_id: ChainId,
        error: ResolveError,
    },
}

impl Resolution {
    pub fn into_record(self) -> Option<BalanceRecord> {
        match self {
            Resolution::Resolved(record) => Some(record),
            Resolution::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Lifetime of a cache entry written after a chain fetch.
    pub cache_ttl: Duration,
    /// Pairs of one batch resolved at the same time.
    pub batch_concurrency: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TOKEN_BALANCE_TTL,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_ttl: config.token_balance_ttl(),
            batch_concurrency: config.batch_concurrency(),
        }
    }
}

pub struct BalanceResolver {
    registry: Arc<ChainRegistry>,
    cache: Arc<dyn BalanceCache>,
    settings: ResolverSettings,
}

impl BalanceResolver {
    pub fn new(
        registry: Arc<ChainRegistry>,
        cache: Arc<dyn BalanceCache>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            settings: ResolverSettings {
                batch_concurrency: settings.batch_concurrency.max(1),
                ..settings
            },
        }
    }

    pub fn settings(&self) -> ResolverSettings {
        self.settings
    }

    /// Resolve one balance, serving a live cache entry unless `force_refresh`
    /// is set. Fresh results are always written back to the cache.
    pub async fn resolve_one(
        &self,
        chain_id: ChainId,
        token: &str,
        wallet: &str,
        force_refresh: bool,
    ) -> Result<BalanceRecord, ResolveError> {
        if !force_refresh {
            match self.cache.get(wallet, token).await {
                Ok(record) => {
                    debug!(wallet, token, chain_id, "balance cache hit");
                    return Ok(record);
                }
                Err(CacheError::Miss) => debug!(wallet, token, chain_id, "balance cache miss"),
                Err(e) => warn!(wallet, token, error = %e, "balance cache read failed"),
            }
        }

        let client = self.registry.client_for(chain_id)?;

        let (raw, metadata) = tokio::try_join!(
            client.get_raw_balance(token, wallet),
            client.get_token_metadata(token),
        )?;

        let record = BalanceRecord::new(wallet, token, chain_id, raw, metadata);

        if let Err(e) = self
            .cache
            .put(wallet, token, &record, self.settings.cache_ttl)
            .await
        {
            warn!(wallet, token, error = %e, "failed to cache balance");
        }

        Ok(record)
    }

    /// Resolve every tracked token of every wallet, keeping one outcome per
    /// pair in wallet order, then token order.
    pub async fn resolve_outcomes(
        &self,
        wallets: &[WalletReference],
        force_refresh: bool,
    ) -> Vec<Resolution> {
        let pairs = wallets.iter().flat_map(|wallet| {
            wallet
                .tracked_tokens()
                .map(move |token| (wallet, token.address.as_str()))
        });

        stream::iter(pairs)
            .map(|(wallet, token)| async move {
                match self
                    .resolve_one(wallet.chain_id, token, &wallet.address, force_refresh)
                    .await
                {
                    Ok(record) => Resolution::Resolved(record),
                    Err(error) => {
                        warn!(
                            wallet = %wallet.address,
                            token,
                            chain_id = wallet.chain_id,
                            error = %error,
                            "skipping token balance"
                        );
                        Resolution::Skipped {
                            wallet: wallet.address.clone(),
                            token: token.to_string(),
                            chain_id: wallet.chain_id,
                            error,
                        }
                    }
                }
            })
            .buffered(self.settings.batch_concurrency)
            .collect()
            .await
    }

    /// Balances for all tracked tokens. Pairs that fail are left out; the
    /// rest keep wallet order, then token order.
    pub async fn resolve_many(
        &self,
        wallets: &[WalletReference],
        force_refresh: bool,
    ) -> Vec<BalanceRecord> {
        self.resolve_outcomes(wallets, force_refresh)
            .await
            .into_iter()
            .filter_map(Resolution::into_record)
            .collect()
    }

    pub async fn resolve_response(
        &self,
        wallets: &[WalletReference],
        force_refresh: bool,
    ) -> BalanceResponse {
        BalanceResponse::new(self.resolve_many(wallets, force_refresh).await, force_refresh)
    }

    /// Drop all cached balances of the given wallets.
    pub async fn invalidate_wallets(&self, wallets: &[WalletReference]) -> usize {
        let addresses: Vec<String> = wallets.iter().map(|w| w.address.clone()).collect();
        let removed = self.cache.invalidate_for_wallets(&addresses).await;
        info!(wallets = addresses.len(), removed, "balance cache refreshed");
        removed
    }
}
