use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "atelier",
    version,
    about = "Atelier - AI-assisted project workspace backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show current server status
    Status,

    /// Create the config and data directories with a default config
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let loader = atelier_config::ConfigLoader::new()?;
    loader.ensure_dirs()?;
    let config = loader.load()?;

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let db_path = loader.database_path(&config);
            let options = atelier_db::PoolOptions {
                max_connections: config.database.max_connections,
                acquire_timeout: Duration::from_secs(config.database.acquire_timeout_secs),
            };
            let db = atelier_db::Database::open(&db_path, options)?;

            let server = atelier_gateway::GatewayServer::new(config, db);
            server.run().await?;
        }
        Commands::Status => {
            let client = reqwest::Client::new();
            let url = format!(
                "http://{}:{}/api/status",
                config.server.host, config.server.port
            );

            match client.get(&url).send().await {
                Ok(resp) => {
                    let body = resp.json::<serde_json::Value>().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("Gateway is not running.");
                }
            }
        }
        Commands::Init => {
            if loader.config_file_exists() {
                println!(
                    "Config already exists in {}",
                    loader.config_dir().display()
                );
            } else {
                let path = loader.write_default_config()?;
                println!("Wrote default config to {}", path.display());
            }
        }
    }

    Ok(())
}
