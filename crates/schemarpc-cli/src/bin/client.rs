//! Greeter client.

use anyhow::{Context, Result};
use clap::Parser;
use schemarpc_core::greeter::{HelloRequest, SayHello, DEFAULT_NAME};
use schemarpc_core::{Address, ClientConfig, RpcClient, RpcConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "schemarpc-client")]
#[command(about = "Call Greeter/SayHello on a schemarpc server")]
struct Args {
    /// Name to greet (the server greets "world" when omitted)
    name: Option<String>,

    /// Server port
    #[arg(short, long, default_value_t = RpcConfig::DEFAULT_PORT)]
    port: u16,

    /// Server host
    #[arg(long, default_value = RpcConfig::DEFAULT_DIAL_HOST)]
    host: String,

    /// Schema file (defaults to the built-in greeter schema)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Give up after this many milliseconds (waits forever by default)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    schemarpc_cli::init_logging(args.debug);

    let schema = schemarpc_cli::load_schema(args.schema.as_deref())?;

    let mut config = ClientConfig::default();
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }

    let address = Address::new(args.host, args.port);
    let client = RpcClient::with_config(address, schema, config);

    info!(
        "Sending request for name: {}",
        args.name.as_deref().unwrap_or(DEFAULT_NAME)
    );
    let request = HelloRequest { name: args.name };
    let reply = client
        .call_typed::<SayHello>(&request)
        .await
        .with_context(|| format!("Error calling SayHello on {}", client.address()))?;

    println!("Received response: \"{}\"", reply.message);

    Ok(())
}
