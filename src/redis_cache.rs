use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::cache::{collect_wallet_keys, normalize_address, BalanceCache, CacheError};
use crate::types::BalanceRecord;

const KEY_PREFIX: &str = "balance";

/// Redis-backed cache. Entries are JSON values under
/// `balance:{wallet}:{token}` and expire through Redis' own TTL.
#[derive(Clone)]
pub struct RedisBalanceCache {
    conn: ConnectionManager,
}

impl RedisBalanceCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    fn key(wallet: &str, token: &str) -> String {
        format!(
            "{KEY_PREFIX}:{}:{}",
            normalize_address(wallet),
            normalize_address(token)
        )
    }

    /// `KEYS` pattern for every token of `wallet`. Glob metacharacters in the
    /// wallet are escaped so it only matches its own keys.
    fn wallet_pattern(wallet: &str) -> String {
        format!("{KEY_PREFIX}:{}:*", escape_glob(&normalize_address(wallet)))
    }
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `PX` argument for `ttl`. Saturates instead of wrapping and never goes
/// below 1ms, which Redis rejects.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl BalanceCache for RedisBalanceCache {
    async fn get(&self, wallet: &str, token: &str) -> Result<BalanceRecord, CacheError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(Self::key(wallet, token)).await.map_err(backend)?;

        match data {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| CacheError::Serialization(e.to_string())),
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
        let json =
            serde_json::to_string(record).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let mut conn = self.conn.clone();

        redis::cmd("SET")
            .arg(Self::key(wallet, token))
            .arg(json)
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn invalidate(&self, wallet: &str, token: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(wallet, token))
            .await
            .map_err(backend)
    }

    async fn invalidate_for_wallets(&self, wallets: &[String]) -> usize {
        let keys = collect_wallet_keys(wallets, |wallet| {
            let mut conn = self.conn.clone();
            let pattern = Self::wallet_pattern(wallet);
            async move { conn.keys::<_, Vec<String>>(pattern).await }
        })
        .await;

        if keys.is_empty() {
            return 0;
        }

        let mut conn = self.conn.clone();
        match conn.del::<_, usize>(&keys).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(keys = keys.len(), error = %e, "failed to delete cached balances");
                0
            }
        }
    }
}
