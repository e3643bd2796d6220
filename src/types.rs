use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Numeric identifier of an EVM network (1 = Ethereum, 56 = BSC, 137 = Polygon).
pub type ChainId = u64;

/// Human-readable name for a chain id. Unknown ids map to `"Unknown"`.
pub fn chain_name(chain_id: ChainId) -> &'static str {
    match chain_id {
        1 => "Ethereum",
        56 => "BSC",
        137 => "Polygon",
        _ => "Unknown",
    }
}

/// A token contract tracked on a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReference {
    pub chain_id: ChainId,
    #[serde(rename = "token_address")]
    pub address: String,
    /// Inactive tokens are skipped by batch resolution.
    #[serde(default = "default_active")]
    pub is_active: bool,
    // Hints kept by the wallet store. On-chain metadata always wins.
    #[serde(rename = "token_symbol", default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(rename = "token_name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "token_decimals", default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

fn default_active() -> bool {
    true
}

impl TokenReference {
    pub fn new(chain_id: ChainId, address: impl Into<String>) -> Self {
        Self {
            chain_id,
            address: address.into(),
            is_active: true,
            symbol: None,
            name: None,
            decimals: None,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A user wallet on one chain together with the tokens tracked on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletReference {
    pub chain_id: ChainId,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tokens: Vec<TokenReference>,
}

impl WalletReference {
    pub fn new(chain_id: ChainId, address: impl Into<String>) -> Self {
        Self {
            chain_id,
            address: address.into(),
            name: None,
            tokens: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: TokenReference) -> Self {
        self.tokens.push(token);
        self
    }

    /// Tokens with the tracking flag set, in stored order.
    pub fn tracked_tokens(&self) -> impl Iterator<Item = &TokenReference> {
        self.tokens.iter().filter(|token| token.is_active)
    }
}

/// ERC20 metadata read from the token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

/// A resolved token balance. This is both the cached value and the value
/// returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub wallet_address: String,
    pub token_address: String,
    /// Balance scaled by `10^decimals`, e.g. `"0.5"`.
    pub balance: String,
    /// Unscaled on-chain integer.
    #[serde(default)]
    pub raw_balance: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub chain_id: ChainId,
    pub chain_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd_value: Option<String>,
}

impl BalanceRecord {
    pub fn new(
        wallet_address: &str,
        token_address: &str,
        chain_id: ChainId,
        raw: U256,
        metadata: TokenMetadata,
    ) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            token_address: token_address.to_string(),
            balance: format_units(raw, metadata.decimals),
            raw_balance: raw.to_string(),
            symbol: metadata.symbol,
            name: metadata.name,
            decimals: metadata.decimals,
            chain_id,
            chain_name: chain_name(chain_id).to_string(),
            usd_value: None,
        }
    }
}

/// What the serving layer hands back for a batch: the balances plus whether
/// cached values were allowed (`force_refresh == false`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balances: Vec<BalanceRecord>,
    pub cached: bool,
}

impl BalanceResponse {
    pub fn new(balances: Vec<BalanceRecord>, force_refresh: bool) -> Self {
        Self {
            balances,
            cached: !force_refresh,
        }
    }
}

/// Scale a raw integer amount by `10^decimals` using its decimal digits, so
/// no precision is lost for any `U256` value or any `u8` decimals.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{digits:0>width$}", width = decimals + 1)
    } else {
        digits
    };

    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}
