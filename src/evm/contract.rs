use alloy::{
    consensus::TxReceipt,
    dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt, Word},
    network::ReceiptResponse,
    primitives::{Address, Bytes, I256, U256},
    providers::Provider,
    rpc::types::{Filter, TransactionRequest},
};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::str::FromStr;

use super::{EventRecord, ReceiptLog, ReceiptRecord, SourceMetadata};
use crate::config::{Config, SecurityConfig};
use crate::evm::{explorer::ExplorerClient, provider::ProviderManager, utils};

/// Executes the contract tool operations against one chain per call.
///
/// Every operation validates its inputs before touching the network and
/// resolves the contract ABI through the explorer client.
#[derive(Debug)]
pub struct ContractManager {
    provider_manager: ProviderManager,
    explorer: ExplorerClient,
    security: SecurityConfig,
}

impl ContractManager {
    pub fn new(config: Config) -> Result<Self> {
        let explorer = ExplorerClient::new(config.explorer.clone());
        let security = config.security.clone();
        let provider_manager = ProviderManager::new(config)?;

        Ok(Self {
            provider_manager,
            explorer,
            security,
        })
    }

    /// Fetch the ABI of a verified contract as an array of descriptors
    pub async fn get_abi(&mut self, address: &str, chain_id: u64) -> Result<Value> {
        let contract_address = utils::validate_address(address)?;
        self.provider_manager.get_chain_config(chain_id)?;

        let abi = self
            .explorer
            .get_abi(contract_address, chain_id)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_explorer_error(&e.to_string(), address)))?;

        serde_json::to_value(&abi).map_err(|e| anyhow!("Failed to serialize ABI: {}", e))
    }

    /// Fetch the verifier metadata record for a contract
    pub async fn get_source_code(&self, address: &str, chain_id: u64) -> Result<SourceMetadata> {
        let contract_address = utils::validate_address(address)?;
        self.provider_manager.get_chain_config(chain_id)?;

        self.explorer
            .get_source(contract_address, chain_id)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_explorer_error(&e.to_string(), address)))
    }

    /// Call a contract function by name with positional arguments.
    ///
    /// Read calls return the decoded value; write calls broadcast a signed
    /// transaction and return its hash.
    pub async fn call_function(
        &mut self,
        address: &str,
        function_name: &str,
        args: &[Value],
        chain_id: u64,
        write: bool,
    ) -> Result<Value> {
        let contract_address = utils::validate_address(address)?;
        utils::validate_identifier(function_name, "function")?;
        self.provider_manager.get_chain_config(chain_id)?;

        let abi = self
            .explorer
            .get_abi(contract_address, chain_id)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_explorer_error(&e.to_string(), address)))?;

        let function = abi
            .functions()
            .find(|f| f.name == function_name)
            .ok_or_else(|| {
                let available: Vec<String> = abi.functions().map(|f| f.name.clone()).collect();
                if available.is_empty() {
                    anyhow!(
                        "Function {} not found in contract: the ABI contains no functions",
                        function_name
                    )
                } else {
                    anyhow!(
                        "Function {} not found in contract. Available functions: {}",
                        function_name,
                        available.join(", ")
                    )
                }
            })?;

        let calldata = encode_function_call(function, args)?;

        if write {
            return self
                .send_write_transaction(contract_address, calldata, chain_id)
                .await;
        }

        let provider = self.provider_manager.get_provider(chain_id)?;
        let call_request = TransactionRequest::default()
            .to(contract_address)
            .input(calldata.into());

        let result_bytes = provider
            .call(&call_request)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_rpc_error(&e.to_string())))?;

        decode_function_result(function, &result_bytes)
    }

    /// Fetch and decode logs for a named event over a block range
    pub async fn get_events(
        &mut self,
        address: &str,
        event_name: &str,
        from_block: Option<u64>,
        to_block: Option<u64>,
        chain_id: u64,
    ) -> Result<Vec<EventRecord>> {
        let contract_address = utils::validate_address(address)?;
        utils::validate_identifier(event_name, "event")?;
        self.provider_manager.get_chain_config(chain_id)?;

        let abi = self
            .explorer
            .get_abi(contract_address, chain_id)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_explorer_error(&e.to_string(), address)))?;

        let event = abi.events().find(|e| e.name == event_name).ok_or_else(|| {
            let available: Vec<String> = abi.events().map(|e| e.name.clone()).collect();
            if available.is_empty() {
                anyhow!(
                    "Event {} not found in contract: the ABI contains no events",
                    event_name
                )
            } else {
                anyhow!(
                    "Event {} not found in contract. Available events: {}",
                    event_name,
                    available.join(", ")
                )
            }
        })?;
        let event = event.clone();

        let provider = self.provider_manager.get_provider(chain_id)?;
        let filter = Filter::new()
            .address(contract_address)
            .event_signature(event.selector())
            .from_block(from_block.unwrap_or(0))
            .to_block(to_block.unwrap_or(u64::MAX));

        let logs = provider
            .get_logs(&filter)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_rpc_error(&e.to_string())))?;

        let records = logs
            .into_iter()
            .enumerate()
            .map(|(index, log)| {
                let args = match event.decode_log(log.data(), false) {
                    Ok(decoded) => {
                        let mut indexed = decoded.indexed.into_iter();
                        let mut body = decoded.body.into_iter();
                        let mut map = serde_json::Map::new();
                        for input in &event.inputs {
                            let value = if input.indexed {
                                indexed.next()
                            } else {
                                body.next()
                            };
                            let json = match value {
                                Some(v) => dyn_sol_value_to_json(&v).unwrap_or(Value::Null),
                                None => Value::Null,
                            };
                            map.insert(input.name.clone(), json);
                        }
                        Value::Object(map)
                    }
                    Err(e) => {
                        tracing::debug!("Failed to decode {} log: {}", event.name, e);
                        Value::Null
                    }
                };

                EventRecord {
                    event: event.name.clone(),
                    address: format!("0x{:x}", log.address()),
                    args,
                    block_number: log.block_number.unwrap_or_default(),
                    transaction_hash: format!("0x{:x}", log.transaction_hash.unwrap_or_default()),
                    log_index: log.log_index.unwrap_or(index as u64),
                    topics: log.topics().iter().map(|t| format!("0x{:x}", t)).collect(),
                    data: format!("0x{}", hex::encode(log.data().data.clone())),
                }
            })
            .collect();

        Ok(records)
    }

    /// Fetch a transaction receipt and flatten it to a serializable record
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
        chain_id: u64,
    ) -> Result<ReceiptRecord> {
        let hash = utils::validate_tx_hash(tx_hash)?;
        let provider = self.provider_manager.get_provider(chain_id)?;

        let receipt = provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_rpc_error(&e.to_string())))?
            .ok_or_else(|| anyhow!("No receipt found for transaction {}", tx_hash))?;

        let logs = receipt
            .inner
            .logs()
            .iter()
            .map(|log| ReceiptLog {
                address: format!("0x{:x}", log.address()),
                topics: log.topics().iter().map(|t| format!("0x{:x}", t)).collect(),
                data: format!("0x{}", hex::encode(log.data().data.clone())),
                log_index: log.log_index,
            })
            .collect();

        Ok(ReceiptRecord {
            transaction_hash: format!("0x{:x}", receipt.transaction_hash),
            block_number: receipt.block_number.unwrap_or_default(),
            block_hash: receipt.block_hash.map(|h| format!("0x{:x}", h)),
            from: format!("0x{:x}", receipt.from),
            to: receipt.to.map(|a| format!("0x{:x}", a)),
            contract_address: receipt
                .contract_address
                .map(|a| format!("0x{:x}", a)),
            status: if receipt.status() { 1 } else { 0 },
            gas_used: utils::u256_to_json(U256::from(receipt.gas_used)),
            effective_gas_price: utils::u256_to_json(U256::from(receipt.effective_gas_price)),
            logs,
        })
    }

    /// Broadcast a state-changing call signed with the configured key
    async fn send_write_transaction(
        &self,
        contract_address: Address,
        calldata: Bytes,
        chain_id: u64,
    ) -> Result<Value> {
        use alloy::{
            network::EthereumWallet, providers::ProviderBuilder, signers::local::PrivateKeySigner,
        };

        if !self.security.allow_write_operations {
            return Err(anyhow!(
                "Write operations are disabled. Enable security.allow_write_operations (or pass --allow-writes) to send transactions."
            ));
        }

        let key = self
            .security
            .private_key
            .as_deref()
            .ok_or_else(|| anyhow!("Write calls require a signer key. Set the PRIVATE_KEY environment variable."))?;

        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let signer =
            PrivateKeySigner::from_str(key).map_err(|e| anyhow!("Invalid private key: {}", e))?;
        let from_address = signer.address();

        let chain_config = self.provider_manager.get_chain_config(chain_id)?;
        let url = chain_config
            .rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC URL '{}': {}", chain_config.rpc_url, e))?;

        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url);

        let tx_request = TransactionRequest::default()
            .to(contract_address)
            .input(calldata.into());

        tracing::info!(
            "Sending transaction from {:?} to {:?}",
            from_address,
            contract_address
        );

        let pending = provider
            .send_transaction(tx_request)
            .await
            .map_err(|e| anyhow!("{}", utils::interpret_rpc_error(&e.to_string())))?;

        let tx_hash = format!("0x{:x}", pending.tx_hash());
        tracing::info!("Transaction sent with hash {}", tx_hash);

        Ok(serde_json::json!({ "transactionHash": tx_hash }))
    }
}

/// Encode positional JSON arguments against a function's ABI inputs
fn encode_function_call(function: &alloy::json_abi::Function, args: &[Value]) -> Result<Bytes> {
    if args.len() != function.inputs.len() {
        let expected: Vec<String> = function
            .inputs
            .iter()
            .map(|input| format!("{} {}", input.ty, input.name))
            .collect();

        return Err(anyhow!(
            "Argument count mismatch for function '{}': expected {} arguments, got {}. Expected: [{}]",
            function.name,
            function.inputs.len(),
            args.len(),
            expected.join(", ")
        ));
    }

    let mut values = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let expected_type = &function.inputs[i].ty;
        let param_name = &function.inputs[i].name;
        let value = json_to_dyn_sol_value(arg, expected_type).map_err(|e| {
            anyhow!(
                "Invalid argument #{} ('{}' of type '{}'): {}",
                i + 1,
                param_name,
                expected_type,
                e
            )
        })?;
        values.push(value);
    }

    let encoded = function
        .abi_encode_input(&values)
        .map_err(|e| anyhow!("Failed to encode function inputs: {}", e))?;

    Ok(encoded.into())
}

/// Decode a call result into JSON
fn decode_function_result(
    function: &alloy::json_abi::Function,
    result_bytes: &Bytes,
) -> Result<Value> {
    if result_bytes.is_empty() {
        return Ok(Value::Null);
    }

    let decoded = function
        .abi_decode_output(result_bytes, false)
        .map_err(|e| anyhow!("Failed to decode output: {}", e))?;

    dyn_sol_values_to_json(&decoded)
}

/// Convert a JSON value to a DynSolValue based on the expected Solidity type
fn json_to_dyn_sol_value(value: &Value, sol_type: &str) -> Result<DynSolValue> {
    match sol_type {
        "address" => {
            let addr_str = value
                .as_str()
                .ok_or_else(|| anyhow!("Address must be a string"))?;
            let address = Address::from_str(addr_str)?;
            Ok(DynSolValue::Address(address))
        }
        ty if ty.starts_with("uint") => {
            let num = match value {
                Value::Number(n) => {
                    let u = n
                        .as_u64()
                        .ok_or_else(|| anyhow!("Uint must be a non-negative integer"))?;
                    U256::from(u)
                }
                Value::String(s) => {
                    if let Some(hex_str) = s.strip_prefix("0x") {
                        U256::from_str_radix(hex_str, 16)
                            .map_err(|_| anyhow!("Invalid uint hex string: {}", s))?
                    } else {
                        U256::from_str(s).map_err(|_| anyhow!("Invalid uint string: {}", s))?
                    }
                }
                _ => return Err(anyhow!("Uint must be a number or string")),
            };
            Ok(DynSolValue::Uint(num, 256))
        }
        ty if ty.starts_with("int") => {
            let num = match value {
                Value::Number(n) => {
                    let i = n.as_i64().ok_or_else(|| anyhow!("Int must be an integer"))?;
                    I256::from_str(&i.to_string()).map_err(|_| anyhow!("Invalid int value"))?
                }
                Value::String(s) => {
                    I256::from_str(s).map_err(|_| anyhow!("Invalid int string: {}", s))?
                }
                _ => return Err(anyhow!("Int must be a number or string")),
            };
            Ok(DynSolValue::Int(num, 256))
        }
        "string" => {
            let s = value
                .as_str()
                .ok_or_else(|| anyhow!("String parameter must be a string"))?;
            Ok(DynSolValue::String(s.to_string()))
        }
        "bool" => {
            let b = value
                .as_bool()
                .ok_or_else(|| anyhow!("Bool parameter must be a boolean"))?;
            Ok(DynSolValue::Bool(b))
        }
        ty if ty.starts_with("bytes") && ty != "bytes" => {
            // Fixed bytes (e.g. bytes32)
            let hex_str = value
                .as_str()
                .ok_or_else(|| anyhow!("Bytes must be a hex string"))?;
            let bytes = hex::decode(hex_str.trim_start_matches("0x"))
                .map_err(|_| anyhow!("Invalid hex string: {}", hex_str))?;

            let mut word_bytes = [0u8; 32];
            let len = bytes.len().min(32);
            word_bytes[..len].copy_from_slice(&bytes[..len]);
            let word = Word::from(word_bytes);

            Ok(DynSolValue::FixedBytes(word, len))
        }
        "bytes" => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| anyhow!("Bytes must be a hex string"))?;
            let bytes = hex::decode(hex_str.trim_start_matches("0x"))
                .map_err(|_| anyhow!("Invalid hex string: {}", hex_str))?;
            Ok(DynSolValue::Bytes(bytes))
        }
        ty if ty.ends_with("[]") => {
            let array = value
                .as_array()
                .ok_or_else(|| anyhow!("Array parameter must be an array"))?;
            let element_type = &ty[..ty.len() - 2];
            let mut dyn_array = Vec::new();
            for element in array {
                dyn_array.push(json_to_dyn_sol_value(element, element_type)?);
            }
            Ok(DynSolValue::Array(dyn_array))
        }
        _ => Err(anyhow!("Unsupported Solidity type: {}", sol_type)),
    }
}

/// Convert decoded return values to JSON (single value unwrapped)
fn dyn_sol_values_to_json(values: &[DynSolValue]) -> Result<Value> {
    if values.len() == 1 {
        dyn_sol_value_to_json(&values[0])
    } else {
        let mut result = Vec::new();
        for value in values {
            result.push(dyn_sol_value_to_json(value)?);
        }
        Ok(Value::Array(result))
    }
}

/// Convert a single DynSolValue to JSON, string-coercing integers above i64 range
fn dyn_sol_value_to_json(value: &DynSolValue) -> Result<Value> {
    match value {
        DynSolValue::Address(addr) => Ok(Value::String(format!("0x{:x}", addr))),
        DynSolValue::Uint(num, _) => Ok(utils::u256_to_json(*num)),
        DynSolValue::Int(num, _) => Ok(utils::i256_to_json(*num)),
        DynSolValue::Bool(b) => Ok(Value::Bool(*b)),
        DynSolValue::String(s) => Ok(Value::String(s.clone())),
        DynSolValue::Bytes(bytes) => Ok(Value::String(format!("0x{}", hex::encode(bytes)))),
        DynSolValue::FixedBytes(bytes, _) => {
            Ok(Value::String(format!("0x{}", hex::encode(bytes))))
        }
        DynSolValue::Array(arr) | DynSolValue::Tuple(arr) => {
            let mut json_arr = Vec::new();
            for item in arr {
                json_arr.push(dyn_sol_value_to_json(item)?);
            }
            Ok(Value::Array(json_arr))
        }
        _ => Err(anyhow!("Unsupported DynSolValue type: {:?}", value)),
    }
}
