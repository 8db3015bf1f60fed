mod config;
mod error;
mod executor;
mod sandbox;
mod server;
mod smoke;
mod templates;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::executor::Executor;
use crate::sandbox::E2bClient;
use crate::server::AppState;
use crate::templates::TemplateChain;

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP gateway that runs code in hosted E2B sandboxes")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default command)
    Serve,
    /// Exercise a running gateway with a sample program
    Smoke {
        #[arg(long, default_value = "http://localhost:8001")]
        base_url: String,
        /// Execution timeout sent with the sample, in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("exec_gateway=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Smoke { base_url, timeout } => smoke::run(&base_url, timeout).await,
    }
}

async fn serve() -> Result<()> {
    let config = GatewayConfig::from_env()?;

    info!("Starting E2B code execution gateway...");

    // Template chain: explicit chain file, or the single configured template
    let chain = match &config.templates_config {
        Some(path) => {
            let chain = TemplateChain::load(path)?;
            info!(
                "Loaded {} template(s) from {}",
                chain.len(),
                path.display()
            );
            chain
        }
        None => {
            info!("Using single template {}", config.template_id);
            TemplateChain::single(&config.template_id)
        }
    };

    let executor = match E2bClient::from_config(&config).context("Failed to build E2B client")? {
        Some(client) => {
            info!("Sandbox API at {}", config.api_url);
            Some(Arc::new(Executor::new(
                Arc::new(client),
                chain.clone(),
                Duration::from_secs(config.timeout_padding_secs),
            )))
        }
        None => {
            warn!("E2B_API_KEY is not set; /execute will answer with a configuration error");
            None
        }
    };

    let state = AppState {
        config: Arc::new(config),
        chain: Arc::new(chain),
        executor,
    };

    server::serve(state).await
}
