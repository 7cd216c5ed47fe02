mod config;
mod evm;
mod sandbox;
mod server;

use anyhow::Result;
use clap::{Arg, Command};
use config::Config;
use server::CodeActServer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging goes to stderr; stdout belongs to the MCP stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = Command::new("codeact-mcp")
        .version("0.1.0")
        .about("MCP server exposing EVM contract tools and a restricted script sandbox")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .help("Override the RPC endpoint for the chain given by --chain-id"),
        )
        .arg(
            Arg::new("chain-id")
                .long("chain-id")
                .value_name("ID")
                .value_parser(clap::value_parser!(u64))
                .help("Chain id targeted by --rpc-url (default 1)"),
        )
        .arg(
            Arg::new("allow-writes")
                .long("allow-writes")
                .help("Allow write operations (transactions)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        let chain_id = matches.get_one::<u64>("chain-id").copied().unwrap_or(1);
        match config
            .chains
            .values_mut()
            .find(|c| c.chain_id == chain_id)
        {
            Some(chain_config) => chain_config.rpc_url = rpc_url.clone(),
            None => {
                error!("--rpc-url given for unconfigured chain id {}", chain_id);
                anyhow::bail!("Unsupported chain id {}", chain_id);
            }
        }
    }

    if matches.get_flag("allow-writes") {
        config.security.allow_write_operations = true;
    }

    info!("Starting codeact MCP server");
    info!(
        "Supported chain ids: {:?}",
        config.supported_chain_ids()
    );
    info!(
        "Write operations allowed: {}",
        config.security.allow_write_operations
    );

    let server = CodeActServer::new(config)?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
