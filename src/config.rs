use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Etherscan v2 API key. Falls back to the ETHERSCAN_API_KEY env var.
    pub api_key: Option<String>,
    /// Attempts made when the API answers HTTP 429. Only 429 is retried.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    /// Base delay for the linear backoff, in seconds.
    #[serde(default = "defaults::backoff_secs")]
    pub backoff_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub allow_write_operations: bool,
    /// Signer key for write calls. Falls back to the PRIVATE_KEY env var.
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "defaults::max_operations")]
    pub max_operations: u64,
    #[serde(default = "defaults::max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "defaults::max_string_size")]
    pub max_string_size: usize,
    #[serde(default = "defaults::max_array_size")]
    pub max_array_size: usize,
    #[serde(default = "defaults::max_map_size")]
    pub max_map_size: usize,
}

/// Field-level defaults so a partially specified TOML section still parses.
mod defaults {
    pub fn max_attempts() -> u32 {
        3
    }

    pub fn backoff_secs() -> u64 {
        1
    }

    pub fn max_operations() -> u64 {
        1_000_000
    }

    pub fn max_call_levels() -> usize {
        64
    }

    pub fn max_string_size() -> usize {
        1024 * 1024
    }

    pub fn max_array_size() -> usize {
        65_536
    }

    pub fn max_map_size() -> usize {
        65_536
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_attempts: defaults::max_attempts(),
            backoff_secs: defaults::backoff_secs(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_operations: defaults::max_operations(),
            max_call_levels: defaults::max_call_levels(),
            max_string_size: defaults::max_string_size(),
            max_array_size: defaults::max_array_size(),
            max_map_size: defaults::max_map_size(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut chains = HashMap::new();

        chains.insert(
            "ethereum".to_string(),
            ChainConfig {
                rpc_url: "https://eth-mainnet.g.alchemy.com/v2/demo".to_string(),
                chain_id: 1,
            },
        );

        chains.insert(
            "base".to_string(),
            ChainConfig {
                rpc_url: "https://base-mainnet.g.alchemy.com/v2/demo".to_string(),
                chain_id: 8453,
            },
        );

        Self {
            chains,
            explorer: ExplorerConfig::default(),
            security: SecurityConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    /// Supported chain ids, sorted, for error messages.
    pub fn supported_chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.values().map(|c| c.chain_id).collect();
        ids.sort_unstable();
        ids
    }

    /// Look up the chain configuration for a chain id. Unsupported ids fail fast.
    pub fn chain_by_id(&self, chain_id: u64) -> Result<&ChainConfig> {
        self.chains
            .values()
            .find(|c| c.chain_id == chain_id)
            .ok_or_else(|| {
                anyhow!(
                    "Unsupported chain id {}. Supported chain ids: {}",
                    chain_id,
                    self.supported_chain_ids()
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }

    /// Apply environment variable substitutions to configuration
    fn apply_env_vars(&mut self) {
        if let Ok(api_key) = std::env::var("ALCHEMY_API_KEY") {
            tracing::info!("Using ALCHEMY_API_KEY environment variable for RPC URLs");

            for (chain_name, chain_config) in &mut self.chains {
                if chain_config.rpc_url.contains("alchemy.com/v2/demo") {
                    chain_config.rpc_url =
                        chain_config.rpc_url.replace("/demo", &format!("/{}", api_key));
                    tracing::debug!("Updated {} RPC URL with API key", chain_name);
                }
            }
        } else {
            for (chain_name, chain_config) in &self.chains {
                if chain_config.rpc_url.contains("/demo") {
                    tracing::warn!(
                        "Using demo RPC endpoint for {}, set ALCHEMY_API_KEY for better reliability",
                        chain_name
                    );
                }
            }
        }

        if self.explorer.api_key.is_none() {
            if let Ok(key) = std::env::var("ETHERSCAN_API_KEY") {
                tracing::debug!("Using ETHERSCAN_API_KEY environment variable");
                self.explorer.api_key = Some(key);
            }
        }

        if self.security.private_key.is_none() {
            if let Ok(key) = std::env::var("PRIVATE_KEY") {
                tracing::debug!("Using PRIVATE_KEY environment variable for write calls");
                self.security.private_key = Some(key);
            }
        }
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("codeact-mcp").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# codeact-mcp configuration file

# Chain configurations. Tools address chains by chain id.
[chains.ethereum]
rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 1

[chains.base]
rpc_url = "https://base-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 8453

# Block-explorer (Etherscan v2) settings
[explorer]
# api_key = "YOUR_ETHERSCAN_API_KEY"
max_attempts = 3    # retries on HTTP 429 only
backoff_secs = 1    # linear backoff base delay

# Security settings
[security]
allow_write_operations = false
# private_key = "0x..."   # or set the PRIVATE_KEY environment variable

# Script sandbox resource ceilings
[sandbox]
max_operations = 1000000
max_call_levels = 64
max_string_size = 1048576
max_array_size = 65536
max_map_size = 65536

# Environment variables:
# ETHERSCAN_API_KEY - explorer API key for ABI and source resolution
# ALCHEMY_API_KEY   - RPC API key (replaces YOUR_API_KEY_HERE above)
# PRIVATE_KEY       - signer key for write calls (with allow_write_operations)
"#;
        sample_config.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chains() {
        let config = Config::default();
        assert_eq!(config.supported_chain_ids(), vec![1, 8453]);
        assert_eq!(config.chain_by_id(1).unwrap().chain_id, 1);
        assert_eq!(config.chain_by_id(8453).unwrap().chain_id, 8453);
    }

    #[test]
    fn test_unsupported_chain_id() {
        let config = Config::default();
        let err = config.chain_by_id(137).unwrap_err().to_string();
        assert!(err.contains("Unsupported chain id 137"));
        assert!(err.contains("1, 8453"));
    }

    #[test]
    fn test_partial_sections_fill_in_defaults() {
        let toml = r#"
            [chains.ethereum]
            rpc_url = "https://eth-mainnet.g.alchemy.com/v2/demo"
            chain_id = 1

            [explorer]
            api_key = "abc123"

            [sandbox]
            max_operations = 500
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.explorer.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.explorer.max_attempts, 3);
        assert_eq!(config.explorer.backoff_secs, 1);
        assert_eq!(config.sandbox.max_operations, 500);
        assert_eq!(config.sandbox.max_call_levels, 64);
        assert_eq!(config.sandbox.max_map_size, 65_536);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::generate_sample();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.explorer.max_attempts, 3);
        assert!(!parsed.security.allow_write_operations);
        assert_eq!(parsed.supported_chain_ids(), vec![1, 8453]);
    }
}
