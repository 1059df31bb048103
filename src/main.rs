//! Dot Traffic - service entry point

use clap::{Parser, Subcommand};
use dot_traffic::config::TrafficConfig;
use dot_traffic::llm::provider::LlmProvider;
use dot_traffic::llm::providers::{AnthropicConfig, AnthropicProvider};
use dot_traffic::model::InboundMessage;
use dot_traffic::observability::init_default_logging;
use dot_traffic::response::TrafficResponse;
use dot_traffic::routing::TrafficRouter;
use dot_traffic::server::{self, AppState};
use dot_traffic::store::{AirtableConfig, AirtableStore, RecordStore};
use dot_traffic::wip::{WipReporter, WipRequest};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// Traffic routing for agency email and Teams messages
#[derive(Parser)]
#[command(name = "dot-traffic")]
#[command(about = "Routes inbound agency messages to the right workflow")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Route one JSON request file and print the response
    Route {
        /// Request body as sent to POST /traffic
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print a client's WIP report as JSON
    Wip {
        /// Client code or client name
        #[arg(value_name = "CLIENT")]
        client: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting dot-traffic v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => run_service(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Route { file } => route_file(config, &file).await,
        Commands::Wip { client } => print_wip(config, &client).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<TrafficConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(TrafficConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["traffic.toml", "config/traffic.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(TrafficConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create traffic.toml".into())
        }
    }
}

fn build_store(config: &TrafficConfig) -> Result<Arc<dyn RecordStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(AirtableStore::new(AirtableConfig {
        api_key: config.get_store_api_key()?,
        base_url: config.store.base_url.clone(),
        base_id: config.store.base_id.clone(),
        timeout: Duration::from_secs(config.store.timeout_secs),
        max_pages: config.store.max_pages,
    })?))
}

/// Wire the live collaborators into a router
fn build_router(
    config: &TrafficConfig,
    store: Arc<dyn RecordStore>,
) -> Result<TrafficRouter, Box<dyn std::error::Error>> {

    let provider: Arc<dyn LlmProvider> = match config.llm.provider.as_str() {
        "anthropic" => Arc::new(AnthropicProvider::new(AnthropicConfig {
            api_key: config.get_llm_api_key()?,
            timeout: Duration::from_secs(config.llm.timeout_secs),
            ..Default::default()
        })?),
        provider => return Err(format!("Unsupported LLM provider: {provider}").into()),
    };

    Ok(TrafficRouter::new(config, store, provider)?)
}

async fn run_service(config: TrafficConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = build_store(&config)?;
    let router = build_router(&config, store.clone())?;
    let wip = WipReporter::new(&config, store)?;

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.service.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(
        service = %config.service.name,
        store_base = %config.store.base_id,
        model = %config.llm.model,
        "Service configured"
    );

    let state = Arc::new(AppState::new(config.service.name.clone(), router, wip));
    server::serve(state, addr, shutdown_signal()).await?;

    info!("Application shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(config: &TrafficConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(
        clients = config.clients.codes.len(),
        aliases = config.clients.aliases.len(),
        domains = config.clients.domains.len(),
        "Configuration validation complete"
    );
    Ok(())
}

async fn route_file(config: TrafficConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let body = std::fs::read_to_string(file)?;
    let message: InboundMessage = serde_json::from_str(&body)?;

    let router = build_router(&config, build_store(&config)?)?;
    match router.route(&message).await {
        Ok(decision) => {
            let response = TrafficResponse::from_decision(&decision, &message);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            let (status, body) = e.to_error_body();
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(format!("routing failed with status {status}").into())
        }
    }
}

async fn print_wip(config: TrafficConfig, client: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = WipReporter::new(&config, build_store(&config)?)?;
    match reporter.report(&WipRequest::for_client(client)).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            let (status, body) = e.to_error_body();
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(format!("WIP report failed with status {status}").into())
        }
    }
}
