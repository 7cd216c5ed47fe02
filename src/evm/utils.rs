use alloy::primitives::{Address, TxHash, I256, U256};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::str::FromStr;

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Invalid contract address: address cannot be empty"));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(anyhow!(
            "Invalid contract address: '{}'. Addresses must start with '0x'",
            address
        ));
    }

    if address.len() != 42 {
        return Err(anyhow!(
            "Invalid contract address: '{}'. Addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        ));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid contract address: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    // Alloy's Address handles EIP-55 checksumming on parse and render
    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid contract address: '{}'. Error: {}", address, e))
}

/// Validates a transaction hash (0x + 64 hex characters)
pub fn validate_tx_hash(hash: &str) -> Result<TxHash> {
    let hash = hash.trim();

    if !hash.starts_with("0x") || hash.len() != 66 {
        return Err(anyhow!(
            "Invalid transaction hash: '{}'. Hashes must be 0x followed by 64 hex characters",
            hash
        ));
    }

    TxHash::from_str(hash).map_err(|e| anyhow!("Invalid transaction hash: '{}'. Error: {}", hash, e))
}

/// Validates a function or event name as a Solidity identifier
pub fn validate_identifier(name: &str, kind: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("{} name cannot be empty", kind));
    }

    let first = name.chars().next().unwrap();
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(anyhow!(
            "Invalid {} name: '{}'. Names must start with a letter or underscore",
            kind,
            name
        ));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow!(
            "Invalid {} name: '{}'. Names can only contain letters, numbers, and underscores",
            kind,
            name
        ));
    }

    Ok(())
}

/// Renders an unsigned integer result as JSON. Values above i64::MAX become
/// decimal strings so they survive JSON number precision limits.
pub fn u256_to_json(num: U256) -> Value {
    match num.to_string().parse::<i64>() {
        Ok(v) => Value::Number(v.into()),
        Err(_) => Value::String(num.to_string()),
    }
}

/// Renders a signed integer result as JSON, string-coerced outside i64 range.
pub fn i256_to_json(num: I256) -> Value {
    match num.to_string().parse::<i64>() {
        Ok(v) => Value::Number(v.into()),
        Err(_) => Value::String(num.to_string()),
    }
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "Call failed: the contract function reverted execution. This usually means the function's requirements were not met or an assertion failed.".to_string()
    } else if error.contains("insufficient funds") {
        "Transaction failed: insufficient funds to cover gas costs.".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Transaction failed: gas limit too low for this call.".to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: nonce too low. Another transaction was likely already mined with this nonce.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: cannot connect to the RPC endpoint. Check the RPC URL configuration.".to_string()
    } else if error.contains("timeout") {
        "Network error: request timed out. The RPC endpoint may be overloaded.".to_string()
    } else if error.contains("rate limit") {
        "Rate limit error: too many requests to the RPC endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

/// Creates user-friendly error messages for explorer API errors
pub fn interpret_explorer_error(error: &str, contract_address: &str) -> String {
    if error.contains("not verified") {
        format!(
            "Contract verification not found: the contract at {} is not verified on the block explorer, so its ABI cannot be resolved automatically.",
            contract_address
        )
    } else if error.contains("rate limit") || error.contains("429") {
        "API rate limit: too many requests to the explorer API. Try again shortly or provide an ETHERSCAN_API_KEY.".to_string()
    } else if error.contains("invalid API key") || error.contains("403") {
        "API authentication error: invalid explorer API key. Check the ETHERSCAN_API_KEY environment variable.".to_string()
    } else if error.contains("connection") || error.contains("network") {
        "Network error: cannot reach the explorer API.".to_string()
    } else {
        format!("Explorer error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_ok());
        assert!(validate_address("0x0000000000000000000000000000000000000000").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("0xinvalid").is_err());
        assert!(validate_address("0x123").is_err()); // too short
        assert!(validate_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err()); // no 0x
        assert!(validate_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err()); // bad hex
    }

    #[test]
    fn test_invalid_address_message() {
        let err = validate_address("0xinvalid").unwrap_err().to_string();
        assert!(err.contains("Invalid contract address"));
    }

    #[test]
    fn test_validate_tx_hash() {
        assert!(validate_tx_hash(
            "0x9af335f5bfe18ba83a45dddf8f0e0b2924c0d1cb907f07a2da263b08a31badba"
        )
        .is_ok());
        assert!(validate_tx_hash("0xinvalid").is_err());
        assert!(validate_tx_hash("").is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("transfer", "function").is_ok());
        assert!(validate_identifier("_internal", "function").is_ok());
        assert!(validate_identifier("Transfer", "event").is_ok());

        assert!(validate_identifier("", "function").is_err());
        assert!(validate_identifier("123invalid", "function").is_err());
        assert!(validate_identifier("invalid-name", "event").is_err());
    }

    #[test]
    fn test_u256_to_json_small_values_stay_numeric() {
        assert_eq!(u256_to_json(U256::from(0u64)), serde_json::json!(0));
        assert_eq!(u256_to_json(U256::from(42u64)), serde_json::json!(42));
        assert_eq!(
            u256_to_json(U256::from(i64::MAX as u64)),
            serde_json::json!(i64::MAX)
        );
    }

    #[test]
    fn test_u256_to_json_large_values_are_strings() {
        // i64::MAX + 1 crosses the 2^63 - 1 boundary
        let over = U256::from(i64::MAX as u64) + U256::from(1u64);
        assert_eq!(u256_to_json(over), serde_json::json!("9223372036854775808"));

        let huge = U256::from_str("1000000000000000000000000").unwrap();
        assert_eq!(
            u256_to_json(huge),
            serde_json::json!("1000000000000000000000000")
        );
    }

    #[test]
    fn test_i256_to_json() {
        assert_eq!(
            i256_to_json(I256::from_str("-42").unwrap()),
            serde_json::json!(-42)
        );
        let big = I256::from_str("170141183460469231731687303715884105728").unwrap();
        assert_eq!(
            i256_to_json(big),
            serde_json::json!("170141183460469231731687303715884105728")
        );
    }
}
