use anyhow::Result;
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    config::Config,
    evm::contract::ContractManager,
    sandbox::{Sandbox, DEFAULT_SESSION},
};

#[derive(Debug, Clone)]
pub struct CodeActServer {
    contract_manager: Arc<tokio::sync::Mutex<ContractManager>>,
    sandbox: Arc<tokio::sync::Mutex<Sandbox>>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct AbiRequest {
    contract_address: String,
    chain_id: u64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SourceCodeRequest {
    contract_address: String,
    chain_id: u64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CallFunctionRequest {
    contract_address: String,
    function_name: String,
    /// Positional arguments matching the function's ABI inputs
    #[serde(default)]
    args: Vec<Value>,
    chain_id: u64,
    /// Send a signed transaction instead of an eth_call
    #[serde(default)]
    write: bool,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct EventsRequest {
    contract_address: String,
    event_name: String,
    from_block: Option<u64>,
    to_block: Option<u64>,
    chain_id: u64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ReceiptRequest {
    transaction_hash: String,
    chain_id: u64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ExecuteCodeRequest {
    /// Script to run in the restricted sandbox
    code: String,
    /// Session whose variables persist across executions
    session: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ResetSessionRequest {
    session: String,
}

impl CodeActServer {
    pub fn new(config: Config) -> Result<Self> {
        let sandbox = Sandbox::new(&config.sandbox);
        let contract_manager = ContractManager::new(config)?;

        Ok(Self {
            contract_manager: Arc::new(tokio::sync::Mutex::new(contract_manager)),
            sandbox: Arc::new(tokio::sync::Mutex::new(sandbox)),
        })
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting codeact MCP server");

        let service = self.clone().serve(stdio()).await?;

        info!("codeact MCP server started");
        let _ = service.waiting().await;
        Ok(())
    }

    fn to_json_string<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|_| "Failed to serialize result".to_string())
    }
}

#[tool(tool_box)]
impl CodeActServer {
    #[tool(description = "Get the ABI of a verified contract as an array of descriptors")]
    async fn get_abi(&self, #[tool(aggr)] request: AbiRequest) -> String {
        let mut manager = self.contract_manager.lock().await;

        match manager
            .get_abi(&request.contract_address, request.chain_id)
            .await
        {
            Ok(abi) => Self::to_json_string(&abi),
            Err(e) => {
                error!("Failed to get ABI: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Get the verified source code and compiler metadata of a contract")]
    async fn get_source_code(&self, #[tool(aggr)] request: SourceCodeRequest) -> String {
        let manager = self.contract_manager.lock().await;

        match manager
            .get_source_code(&request.contract_address, request.chain_id)
            .await
        {
            Ok(meta) => Self::to_json_string(&meta),
            Err(e) => {
                error!("Failed to get source code: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(
        description = "Call a contract function by name with positional args. Read calls return the decoded value; write calls return the transaction hash."
    )]
    async fn call_function(&self, #[tool(aggr)] request: CallFunctionRequest) -> String {
        let mut manager = self.contract_manager.lock().await;

        match manager
            .call_function(
                &request.contract_address,
                &request.function_name,
                &request.args,
                request.chain_id,
                request.write,
            )
            .await
        {
            Ok(result) => Self::to_json_string(&result),
            Err(e) => {
                error!("Failed to call function: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Get decoded logs for a named contract event over a block range")]
    async fn get_events(&self, #[tool(aggr)] request: EventsRequest) -> String {
        let mut manager = self.contract_manager.lock().await;

        match manager
            .get_events(
                &request.contract_address,
                &request.event_name,
                request.from_block,
                request.to_block,
                request.chain_id,
            )
            .await
        {
            Ok(events) => Self::to_json_string(&events),
            Err(e) => {
                error!("Failed to get events: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Get the receipt of a mined transaction")]
    async fn get_transaction_receipt(&self, #[tool(aggr)] request: ReceiptRequest) -> String {
        let manager = self.contract_manager.lock().await;

        match manager
            .get_transaction_receipt(&request.transaction_hash, request.chain_id)
            .await
        {
            Ok(receipt) => Self::to_json_string(&receipt),
            Err(e) => {
                error!("Failed to get transaction receipt: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(
        description = "Execute a script in the restricted sandbox. Returns the captured output and the variables newly bound in the session."
    )]
    async fn execute_code(&self, #[tool(aggr)] request: ExecuteCodeRequest) -> String {
        let session = request.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let mut sandbox = self.sandbox.lock().await;

        // Sandbox failures come back as text inside the outcome, never as
        // an error at the tool boundary.
        let outcome = sandbox.execute(session, &request.code);
        Self::to_json_string(&outcome)
    }

    #[tool(description = "Discard a sandbox session's variables")]
    async fn reset_session(&self, #[tool(aggr)] request: ResetSessionRequest) -> String {
        let mut sandbox = self.sandbox.lock().await;

        if sandbox.reset_session(&request.session) {
            format!("Session '{}' reset", request.session)
        } else {
            format!("Session '{}' did not exist", request.session)
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for CodeActServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "MCP server for EVM contract analysis. Exposes ABI/source lookup, contract \
                 function calls, event and receipt retrieval, and a restricted script sandbox \
                 whose sessions keep variables between executions."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
