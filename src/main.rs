use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use fieldgate::bootstrap::Server;
use fieldgate::config::Config;
use fieldgate::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "fieldgated")]
#[command(author, version, about = "Rule-gated document RPC daemon")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&config.telemetry)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting fieldgated"
    );

    info!(
        collections = config.collections.len(),
        tokens = config.identity.tokens.len(),
        "configuration loaded"
    );

    // Validate only mode
    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
