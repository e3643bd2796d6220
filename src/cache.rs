use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::BalanceRecord;

#[derive(Debug, Error)]
pub enum CacheError {
    /// No live entry for the key. Only used to steer the resolver onto the
    /// chain path.
    #[error("cache miss")]
    Miss,

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Time-bounded store of resolved balances keyed by (wallet, token).
///
/// Expiry is the only eviction policy. Addresses are matched
/// case-insensitively.
#[async_trait]
pub trait BalanceCache: Send + Sync {
    /// The live record for the pair, or [`CacheError::Miss`] if absent or expired.
    async fn get(&self, wallet: &str, token: &str) -> Result<BalanceRecord, CacheError>;

    /// Store `record`, replacing any previous entry and restarting its TTL.
    async fn put(
        &self,
        wallet: &str,
        token: &str,
        record: &BalanceRecord,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn invalidate(&self, wallet: &str, token: &str) -> Result<(), CacheError>;

    /// Drop every entry of the given wallets, across all tokens. Best effort:
    /// a wallet whose keys cannot be enumerated is skipped. Returns the number
    /// of removed entries.
    async fn invalidate_for_wallets(&self, wallets: &[String]) -> usize;
}

pub(crate) fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Enumerate the stored keys of each wallet with `list_keys`. A wallet whose
/// lookup fails is logged and skipped; the others are still collected.
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
pub(crate) async fn collect_wallet_keys<F, Fut, E>(
    wallets: &[String],
    mut list_keys: F,
) -> Vec<String>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<Vec<String>, E>>,
    E: Display,
{
    let mut keys = Vec::new();
    for wallet in wallets {
        match list_keys(wallet).await {
            Ok(matched) => keys.extend(matched),
            Err(e) => warn!(wallet = %wallet, error = %e, "failed to enumerate cached balances"),
        }
    }
    keys
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    wallet: String,
    token: String,
}

impl CacheKey {
    fn new(wallet: &str, token: &str) -> Self {
        Self {
            wallet: normalize_address(wallet),
            token: normalize_address(token),
        }
    }
}

struct CacheEntry {
    record: BalanceRecord,
    expires_at: Instant,
}

/// Writes between two sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL: usize = 1024;

/// In-process cache. Expired entries are dropped lazily on `get`, and every
/// `purge_interval` writes `put` sweeps the whole map with
/// [`MemoryBalanceCache::purge_expired`]. Runs on the tokio clock, so a
/// paused runtime controls expiry.
pub struct MemoryBalanceCache {
    entries: DashMap<CacheKey, CacheEntry>,
    writes: AtomicUsize,
    purge_interval: usize,
}

impl Default for MemoryBalanceCache {
    fn default() -> Self {
        Self::with_purge_interval(DEFAULT_PURGE_INTERVAL)
    }
}

impl MemoryBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purge_interval(purge_interval: usize) -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicUsize::new(0),
            purge_interval: purge_interval.max(1),
        }
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BalanceCache for MemoryBalanceCache {
    async fn get(&self, wallet: &str, token: &str) -> Result<BalanceRecord, CacheError> {
        let key = CacheKey::new(wallet, token);
        let now = Instant::now();

        let cached = self
            .entries
            .get(&key)
            .map(|entry| (entry.expires_at > now).then(|| entry.record.clone()));

        match cached {
            Some(Some(record)) => Ok(record),
            Some(None) => {
                self.entries.remove_if(&key, |_, entry| entry.expires_at <= now);
                Err(CacheError::Miss)
            }
            None => Err(CacheError::Miss),
        }
    }

    async fn put(
        &self,
        wallet: &str,
        token: &str,
        record: &BalanceRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("ttl {ttl:?} out of range")))?;

        self.entries.insert(
            CacheKey::new(wallet, token),
            CacheEntry {
                record: record.clone(),
                expires_at,
            },
        );

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.purge_interval == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, "swept expired balances");
            }
        }
        Ok(())
    }

    async fn invalidate(&self, wallet: &str, token: &str) -> Result<(), CacheError> {
        self.entries.remove(&CacheKey::new(wallet, token));
        Ok(())
    }

    async fn invalidate_for_wallets(&self, wallets: &[String]) -> usize {
        let targets: HashSet<String> = wallets.iter().map(|w| normalize_address(w)).collect();
        if targets.is_empty() {
            return 0;
        }

        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !targets.contains(&key.wallet);
            if !keep {
                removed += 1;
            }
            keep
        });

        debug!(wallets = targets.len(), removed, "invalidated cached balances");
        removed
    }
}
