use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use balance_tracker::{
    BalanceCache, BalanceResponse, Config, MemoryBalanceCache, TokenReference, WalletReference,
};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "balance-tracker")]
#[command(about = "Resolve ERC20 balances for tracked wallets across EVM chains", long_about = None)]
struct Args {
    /// JSON config file (defaults to the built-in chain set)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file holding a list of wallets with their tracked tokens
    #[arg(short, long, conflicts_with_all = ["address", "token"])]
    wallets: Option<PathBuf>,

    /// Chain ID of the wallet given with --address
    #[arg(long, default_value_t = 1)]
    chain_id: u64,

    /// Wallet address to query
    #[arg(short, long)]
    address: Option<String>,

    /// Token contract to query (repeatable)
    #[arg(short, long)]
    token: Vec<String>,

    /// Skip cached balances and read every token from the chain
    #[arg(long)]
    force_refresh: bool,

    /// Drop cached balances of the given wallets before resolving
    #[arg(long)]
    invalidate: bool,

    /// Print the response as JSON
    #[arg(long)]
    json: bool,

    /// Redis URL for a shared balance cache
    #[cfg(feature = "redis")]
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
}

impl Args {
    fn load_wallets(&self) -> Result<Vec<WalletReference>> {
        if let Some(path) = &self.wallets {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read wallets file {}", path.display()))?;
            return serde_json::from_str(&data)
                .with_context(|| format!("invalid wallets file {}", path.display()));
        }

        let Some(address) = &self.address else {
            bail!("either --wallets or --address is required");
        };
        if self.token.is_empty() {
            bail!("at least one --token is required with --address");
        }

        let wallet = self
            .token
            .iter()
            .fold(WalletReference::new(self.chain_id, address), |wallet, token| {
                wallet.with_token(TokenReference::new(self.chain_id, token))
            });
        Ok(vec![wallet])
    }

    #[cfg(feature = "redis")]
    async fn cache(&self) -> Result<Arc<dyn BalanceCache>> {
        if let Some(url) = &self.redis_url {
            let cache = balance_tracker::RedisBalanceCache::connect(url)
                .await
                .context("failed to connect to Redis")?;
            return Ok(Arc::new(cache));
        }
        Ok(Arc::new(MemoryBalanceCache::new()))
    }

    #[cfg(not(feature = "redis"))]
    async fn cache(&self) -> Result<Arc<dyn BalanceCache>> {
        Ok(Arc::new(MemoryBalanceCache::new()))
    }
}

fn print_table(response: &BalanceResponse) {
    println!("{}", "=".repeat(72));
    for balance in &response.balances {
        println!(
            "{:10} | {:6} | {:>28} | {}",
            balance.chain_name, balance.symbol, balance.balance, balance.wallet_address
        );
    }
    println!("{}", "=".repeat(72));
    println!(
        "{} balance(s), {}",
        response.balances.len(),
        if response.cached { "cache allowed" } else { "fresh from chain" }
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let wallets = args.load_wallets()?;
    let resolver = balance_tracker::resolver_from_config(&config, args.cache().await?)?;

    if args.invalidate {
        resolver.invalidate_wallets(&wallets).await;
    }

    info!(wallets = wallets.len(), force_refresh = args.force_refresh, "resolving balances");
    let response = resolver.resolve_response(&wallets, args.force_refresh).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_table(&response);
    }

    Ok(())
}
