use crate::config::{ChainConfig, Config};
use alloy::{
    providers::{ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Holds one HTTP provider per configured chain, keyed by chain id.
#[derive(Debug)]
pub struct ProviderManager {
    providers: HashMap<u64, RootProvider<Http<Client>>>,
    config: Config,
}

impl ProviderManager {
    pub fn new(config: Config) -> Result<Self> {
        let mut providers = HashMap::new();

        for chain_config in config.chains.values() {
            let provider = Self::create_provider(chain_config)?;
            providers.insert(chain_config.chain_id, provider);
        }

        Ok(Self { providers, config })
    }

    fn create_provider(chain_config: &ChainConfig) -> Result<RootProvider<Http<Client>>> {
        let provider = ProviderBuilder::new().on_http(chain_config.rpc_url.parse()?);

        Ok(provider)
    }

    pub fn get_provider(&self, chain_id: u64) -> Result<&RootProvider<Http<Client>>> {
        // chain_by_id carries the fail-fast "unsupported chain id" message
        self.config.chain_by_id(chain_id)?;
        self.providers
            .get(&chain_id)
            .ok_or_else(|| anyhow!("No provider initialized for chain id {}", chain_id))
    }

    pub fn get_chain_config(&self, chain_id: u64) -> Result<&ChainConfig> {
        self.config.chain_by_id(chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_providers_built_for_default_chains() {
        let manager = ProviderManager::new(Config::default()).unwrap();
        assert!(manager.get_provider(1).is_ok());
        assert!(manager.get_provider(8453).is_ok());
    }

    #[test]
    fn test_unsupported_chain_fails_fast() {
        let manager = ProviderManager::new(Config::default()).unwrap();
        let err = manager.get_provider(42161).unwrap_err().to_string();
        assert!(err.contains("Unsupported chain id 42161"));
    }
}
