use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use super::SourceMetadata;
use crate::config::ExplorerConfig;

const API_BASE: &str = "https://api.etherscan.io/v2/api";

/// Client for the Etherscan v2 API (one endpoint, chain selected by id).
///
/// ABIs are cached in memory and on disk; source lookups go straight to the
/// API. HTTP 429 is retried with a linear backoff, nothing else is.
#[derive(Debug)]
pub struct ExplorerClient {
    client: Client,
    config: ExplorerConfig,
    cache_dir: PathBuf,
    memory_cache: HashMap<String, JsonAbi>,
}

impl ExplorerClient {
    pub fn new(config: ExplorerConfig) -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codeact-mcp")
            .join("abi-cache");

        Self::with_cache_dir(config, cache_dir)
    }

    pub fn with_cache_dir(config: ExplorerConfig, cache_dir: PathBuf) -> Self {
        Self {
            client: Client::new(),
            config,
            cache_dir,
            memory_cache: HashMap::new(),
        }
    }

    /// Get the ABI for a contract, trying cache first, then the explorer API
    pub async fn get_abi(&mut self, address: Address, chain_id: u64) -> Result<JsonAbi> {
        let cache_key = Self::cache_key(address, chain_id);

        if let Some(abi) = self.memory_cache.get(&cache_key) {
            debug!("ABI cache hit for {:?}", address);
            return Ok(abi.clone());
        }

        if let Ok(abi) = self.load_cached_abi(&cache_key).await {
            debug!("ABI disk cache hit for {:?}", address);
            self.memory_cache.insert(cache_key.clone(), abi.clone());
            return Ok(abi);
        }

        info!("Fetching ABI from explorer for {:?}", address);
        let body = self.request(chain_id, "getabi", address).await?;

        if body["status"] != "1" {
            let message = body["message"].as_str().unwrap_or("Unknown error");
            let result = body["result"].as_str().unwrap_or("");
            if result.contains("not verified") {
                return Err(anyhow!("Contract source code is not verified"));
            }
            return Err(anyhow!("Explorer API error: {} {}", message, result));
        }

        let abi_str = body["result"]
            .as_str()
            .ok_or_else(|| anyhow!("No ABI found in explorer response"))?;

        let abi: JsonAbi = serde_json::from_str(abi_str)
            .map_err(|e| anyhow!("Failed to parse ABI JSON: {}", e))?;

        if let Err(e) = self.cache_abi(&cache_key, &abi).await {
            warn!("Failed to cache ABI for {:?}: {}", address, e);
        }
        self.memory_cache.insert(cache_key, abi.clone());

        Ok(abi)
    }

    /// Get the verifier metadata record for a contract
    pub async fn get_source(&self, address: Address, chain_id: u64) -> Result<SourceMetadata> {
        info!("Fetching source metadata from explorer for {:?}", address);
        let body = self.request(chain_id, "getsourcecode", address).await?;

        if body["status"] != "1" {
            let message = body["message"].as_str().unwrap_or("Unknown error");
            return Err(anyhow!("Explorer API error: {}", message));
        }

        let entry = body["result"]
            .as_array()
            .and_then(|arr| arr.first())
            .cloned()
            .ok_or_else(|| anyhow!("Empty source result from explorer"))?;

        let meta: SourceMetadata = serde_json::from_value(entry)
            .map_err(|e| anyhow!("Failed to parse source metadata: {}", e))?;

        if meta.source_code.is_empty() {
            return Err(anyhow!("Contract source code is not verified"));
        }

        Ok(meta)
    }

    /// One explorer API call with the fixed 429 retry loop.
    async fn request(&self, chain_id: u64, action: &str, address: Address) -> Result<Value> {
        let url = self.build_url(chain_id, action, address);
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| anyhow!("Failed to reach explorer API: {}", e))?;

            match retry_decision(response.status(), None, attempt, &self.config) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Explorer rate limited (attempt {}/{}), retrying in {:?}",
                        attempt, attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                RetryDecision::GiveUp => {
                    return Err(anyhow!(
                        "Explorer API rate limited after {} attempts (HTTP 429)",
                        attempts
                    ));
                }
                RetryDecision::Proceed => {}
            }

            if !response.status().is_success() {
                return Err(anyhow!(
                    "Explorer API returned HTTP {}",
                    response.status().as_u16()
                ));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| anyhow!("Failed to parse explorer response: {}", e))?;

            // The API sometimes reports rate limiting in-band with HTTP 200
            match retry_decision(StatusCode::OK, body["result"].as_str(), attempt, &self.config) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Explorer rate limited in-band (attempt {}/{}), retrying in {:?}",
                        attempt, attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                RetryDecision::GiveUp => {
                    return Err(anyhow!(
                        "Explorer API rate limited after {} attempts",
                        attempts
                    ));
                }
                RetryDecision::Proceed => return Ok(body),
            }
        }

        Err(anyhow!("Explorer API rate limited after {} attempts", attempts))
    }

    fn build_url(&self, chain_id: u64, action: &str, address: Address) -> String {
        let mut url = format!(
            "{}?chainid={}&module=contract&action={}&address=0x{:x}",
            API_BASE, chain_id, action, address
        );

        if let Some(api_key) = &self.config.api_key {
            url.push_str(&format!("&apikey={}", api_key));
        }

        url
    }

    fn cache_key(address: Address, chain_id: u64) -> String {
        format!("{}_0x{:x}", chain_id, address)
    }

    async fn load_cached_abi(&self, cache_key: &str) -> Result<JsonAbi> {
        let cache_path = self.cache_dir.join(format!("{}.json", cache_key));

        if !cache_path.exists() {
            return Err(anyhow!("Cache file does not exist"));
        }

        let content = fs::read_to_string(&cache_path)
            .await
            .map_err(|e| anyhow!("Failed to read cache file: {}", e))?;

        let abi: JsonAbi = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse cached ABI: {}", e))?;

        Ok(abi)
    }

    async fn cache_abi(&self, cache_key: &str, abi: &JsonAbi) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| anyhow!("Failed to create cache directory: {}", e))?;
        }

        let cache_path = self.cache_dir.join(format!("{}.json", cache_key));
        let content = serde_json::to_string_pretty(abi)
            .map_err(|e| anyhow!("Failed to serialize ABI: {}", e))?;

        fs::write(&cache_path, content)
            .await
            .map_err(|e| anyhow!("Failed to write cache file: {}", e))?;

        debug!("Cached ABI to {:?}", cache_path);
        Ok(())
    }

    /// Add an ABI directly (for unverified contracts or tests)
    pub fn add_manual_abi(&mut self, address: Address, chain_id: u64, abi: JsonAbi) {
        let cache_key = Self::cache_key(address, chain_id);
        self.memory_cache.insert(cache_key, abi);
        info!("Added manual ABI for {:?}", address);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RetryDecision {
    /// Rate limited with attempts left: wait out the linear backoff
    RetryAfter(Duration),
    /// Rate limited on the final attempt
    GiveUp,
    /// Not rate limited; the caller judges the response
    Proceed,
}

/// Retry policy for one explorer response. Only rate limiting is retried:
/// HTTP 429, or an in-band "rate limit" message in the result body. The
/// delay grows linearly with the attempt number.
fn retry_decision(
    status: StatusCode,
    body_result: Option<&str>,
    attempt: u32,
    config: &ExplorerConfig,
) -> RetryDecision {
    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || body_result.map_or(false, |s| s.to_lowercase().contains("rate limit"));

    if !rate_limited {
        return RetryDecision::Proceed;
    }

    if attempt < config.max_attempts.max(1) {
        RetryDecision::RetryAfter(Duration::from_secs(config.backoff_secs * attempt as u64))
    } else {
        RetryDecision::GiveUp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::tempdir;

    fn test_client(api_key: Option<&str>) -> ExplorerClient {
        let temp_dir = tempdir().unwrap();
        ExplorerClient::with_cache_dir(
            ExplorerConfig {
                api_key: api_key.map(|s| s.to_string()),
                max_attempts: 3,
                backoff_secs: 1,
            },
            temp_dir.path().to_path_buf(),
        )
    }

    #[test]
    fn test_build_url() {
        let client = test_client(Some("KEY"));
        let address = Address::from_str("0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb").unwrap();

        let url = client.build_url(8453, "getabi", address);
        assert!(url.starts_with("https://api.etherscan.io/v2/api?chainid=8453"));
        assert!(url.contains("action=getabi"));
        assert!(url.contains("address=0x50c5725949a6f0c72e6c4a641f24049a917db0cb"));
        assert!(url.ends_with("&apikey=KEY"));
    }

    #[test]
    fn test_build_url_without_api_key() {
        let client = test_client(None);
        let address = Address::ZERO;

        let url = client.build_url(1, "getsourcecode", address);
        assert!(url.contains("chainid=1"));
        assert!(!url.contains("apikey"));
    }

    #[tokio::test]
    async fn test_manual_abi_and_memory_cache() {
        let mut client = test_client(None);
        let address = Address::ZERO;
        let abi: JsonAbi = serde_json::from_str(
            r#"[{"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}]"#,
        )
        .unwrap();

        client.add_manual_abi(address, 1, abi);

        let cached = client.get_abi(address, 1).await.unwrap();
        assert!(cached.functions().any(|f| f.name == "balanceOf"));
    }

    fn retry_config() -> ExplorerConfig {
        ExplorerConfig {
            api_key: None,
            max_attempts: 3,
            backoff_secs: 1,
        }
    }

    #[test]
    fn test_retry_on_http_429_with_linear_backoff() {
        let config = retry_config();

        assert_eq!(
            retry_decision(StatusCode::TOO_MANY_REQUESTS, None, 1, &config),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            retry_decision(StatusCode::TOO_MANY_REQUESTS, None, 2, &config),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_retry_gives_up_at_attempt_cap() {
        let config = retry_config();

        assert_eq!(
            retry_decision(StatusCode::TOO_MANY_REQUESTS, None, 3, &config),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_retry_on_in_band_rate_limit_message() {
        let config = retry_config();

        assert_eq!(
            retry_decision(StatusCode::OK, Some("Max rate limit reached"), 1, &config),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_no_retry_on_other_failures() {
        let config = retry_config();

        assert_eq!(
            retry_decision(StatusCode::INTERNAL_SERVER_ERROR, None, 1, &config),
            RetryDecision::Proceed
        );
        assert_eq!(
            retry_decision(StatusCode::NOT_FOUND, None, 1, &config),
            RetryDecision::Proceed
        );
        assert_eq!(
            retry_decision(
                StatusCode::OK,
                Some("Contract source code not verified"),
                1,
                &config
            ),
            RetryDecision::Proceed
        );
    }

    #[test]
    fn test_retry_with_single_attempt_config() {
        let config = ExplorerConfig {
            api_key: None,
            max_attempts: 1,
            backoff_secs: 1,
        };

        assert_eq!(
            retry_decision(StatusCode::TOO_MANY_REQUESTS, None, 1, &config),
            RetryDecision::GiveUp
        );
    }

    #[tokio::test]
    async fn test_disk_cache_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let client = ExplorerClient::with_cache_dir(
            ExplorerConfig::default(),
            temp_dir.path().to_path_buf(),
        );

        let abi: JsonAbi = serde_json::from_str("[]").unwrap();
        client.cache_abi("1_0x00", &abi).await.unwrap();

        let loaded = client.load_cached_abi("1_0x00").await.unwrap();
        assert_eq!(loaded.functions().count(), 0);
    }
}
