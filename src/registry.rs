use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::chain::ChainClient;
use crate::config::Config;
use crate::ethereum::EvmChainClient;
use crate::resolver::ResolveError;
use crate::types::{chain_name, ChainId};

/// Fixed mapping from chain id to the client serving it. Built once at
/// startup and shared read-only afterwards.
pub struct ChainRegistry {
    clients: HashMap<ChainId, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
    pub fn builder() -> ChainRegistryBuilder {
        ChainRegistryBuilder::default()
    }

    /// One [`EvmChainClient`] per configured chain.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.request_timeout();
        let mut builder = Self::builder();

        for (key, chain) in &config.chains {
            let client = EvmChainClient::new(&chain.rpc, timeout)
                .with_context(|| format!("failed to create client for chain '{key}'"))?;
            builder = builder.register(chain.chain_id, Arc::new(client))?;
        }

        let registry = builder.build();
        info!(chains = ?registry.supported_chains(), "chain registry ready");
        Ok(registry)
    }

    pub fn client_for(&self, chain_id: ChainId) -> Result<Arc<dyn ChainClient>, ResolveError> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or(ResolveError::UnsupportedChain(chain_id))
    }

    /// Registered chain ids in ascending order.
    pub fn supported_chains(&self) -> Vec<ChainId> {
        let mut ids: Vec<_> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[derive(Default)]
pub struct ChainRegistryBuilder {
    clients: HashMap<ChainId, Arc<dyn ChainClient>>,
}

impl ChainRegistryBuilder {
    pub fn register(mut self, chain_id: ChainId, client: Arc<dyn ChainClient>) -> Result<Self> {
        if self.clients.contains_key(&chain_id) {
            bail!("chain {chain_id} ({}) registered twice", chain_name(chain_id));
        }
        self.clients.insert(chain_id, client);
        Ok(self)
    }

    pub fn build(self) -> ChainRegistry {
        ChainRegistry {
            clients: self.clients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;

    #[test]
    fn test_client_for_registered_chain() {
        let registry = ChainRegistry::builder()
            .register(1, Arc::new(MockChainClient::new()))
            .unwrap()
            .register(56, Arc::new(MockChainClient::new()))
            .unwrap()
            .build();

        assert!(registry.client_for(1).is_ok());
        assert!(registry.client_for(56).is_ok());
        assert_eq!(registry.supported_chains(), vec![1, 56]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_chain_is_unsupported() {
        let registry = ChainRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.client_for(137),
            Err(ResolveError::UnsupportedChain(137))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = ChainRegistry::builder()
            .register(1, Arc::new(MockChainClient::new()))
            .unwrap()
            .register(1, Arc::new(MockChainClient::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_default_config_covers_three_chains() {
        let config = Config::load().unwrap();
        let registry = ChainRegistry::from_config(&config).unwrap();
        assert_eq!(registry.supported_chains(), vec![1, 56, 137]);
    }
}
