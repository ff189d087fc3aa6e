use std::path::PathBuf;

use clap::{Parser, Subcommand};

use arch_node::config::load_config;
use arch_node::lifecycle;
use arch_node::observability::logging;

#[derive(Parser)]
#[command(name = "arch-node", version)]
#[command(about = "Node agent for a managed proxy engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node: engine, reconciler and local API
    Start {
        /// Node settings file; defaults apply when it does not exist
        #[arg(short, long, default_value = "configs/node.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    println!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Start { config } => {
            let settings = load_config(&config)?;
            logging::init(&settings.logging);

            tracing::info!(
                config = %config.display(),
                state = %settings.state.path,
                engine = %settings.engine.binary_path,
                sync_interval_secs = settings.sync.interval_secs,
                "Configuration loaded"
            );

            lifecycle::run(settings).await?;
        }
    }

    Ok(())
}
