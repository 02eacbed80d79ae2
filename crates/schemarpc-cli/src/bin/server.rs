//! Greeter server.
//!
//! Binds the greeter handlers to a schemarpc server and serves until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use schemarpc_core::greeter::{self, SayHello};
use schemarpc_core::{Address, HandlerRegistry, RpcConfig, RpcServer, UnaryMethod};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "schemarpc-server")]
#[command(about = "Serve the Greeter service over schemarpc")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = RpcConfig::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = RpcConfig::DEFAULT_BIND_HOST)]
    host: String,

    /// Schema file (defaults to the built-in greeter schema)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    schemarpc_cli::init_logging(args.debug);

    info!("Starting schemarpc server");

    let schema = schemarpc_cli::load_schema(args.schema.as_deref())?;
    let mut registry = HandlerRegistry::new(schema.clone());
    if schema.method(SayHello::SERVICE, SayHello::METHOD).is_ok() {
        greeter::register(&mut registry)?;
    } else {
        warn!(
            "Schema does not declare {}/{}, serving without handlers",
            SayHello::SERVICE,
            SayHello::METHOD
        );
    }

    let address = Address::new(args.host, args.port);
    let mut server = RpcServer::bind(&address, Arc::new(registry))
        .await
        .with_context(|| format!("Failed to start server on {}", address))?;

    // Read by scripts and tests to discover an auto-assigned port.
    println!("RPC_PORT={}", server.addr().port());

    info!("Server listening on {}", server.addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    server.shutdown();
    server.stopped().await;

    Ok(())
}
