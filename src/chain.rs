use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use thiserror::Error;

use crate::types::TokenMetadata;

/// Failures talking to one chain's RPC endpoint.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The endpoint could not be reached or the connection dropped.
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a JSON-RPC error, e.g. a reverted call.
    #[error("contract call failed: {0}")]
    ContractCall(String),

    #[error("rpc request timed out after {0:?}")]
    Timeout(Duration),

    /// The call succeeded but its return data is not what the ABI promises.
    #[error("failed to decode contract response: {0}")]
    Decode(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Read-only access to ERC20 contracts on a single chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `balanceOf(owner)` on the token contract, unscaled.
    async fn get_raw_balance(&self, token: &str, owner: &str) -> Result<U256, ChainError>;

    /// `symbol()`, `name()` and `decimals()` of the token contract. Fails if
    /// any of the three calls fails.
    async fn get_token_metadata(&self, token: &str) -> Result<TokenMetadata, ChainError>;
}
