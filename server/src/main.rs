//! Orchestrator daemon entry point.

use anyhow::Result;
use clap::Parser;

use server::telemetry;
use server::{Config, Server};

#[derive(Parser, Debug)]
#[command(name = "orchestratord", about = "Multi-agent team orchestrator daemon")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if args.check_config {
        config.validate()?;
        println!("Configuration OK");
        return Ok(());
    }

    telemetry::init_telemetry(&config.logging)?;
    telemetry::log_startup_info(&config);

    let server = Server::build(config).await?;
    server.start_background();

    tracing::info!("Orchestrator running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    server.shutdown();
    Ok(())
}
