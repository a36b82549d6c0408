use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use automation_core::ConfigCatalog;
use clap::{Parser, Subcommand};
use orchestrator::TaskRegistry;
use server::config::{load_custom_configs, ServerConfig};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_FILE: &str = "automation-studio.toml";

#[derive(Parser)]
#[command(name = "automation-studio")]
#[command(about = "Browser automation task orchestration service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP service
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Base URL of the browser agent
        #[arg(long)]
        agent_url: Option<String>,
    },
    /// List the available automation configurations
    Configs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { force }) => init_config(&cli.config, force).await,
        Some(Commands::Serve { port, agent_url }) => serve(&cli.config, port, agent_url).await,
        Some(Commands::Configs) => list_configs(&cli.config).await,
        None => serve(&cli.config, None, None).await,
    }
}

async fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    ServerConfig::default()
        .write(path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote default configuration to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Point [server].agent_url at your browser agent");
    println!("  2. Run 'automation-studio serve'");

    Ok(())
}

async fn load_catalog(config: &ServerConfig) -> ConfigCatalog {
    let mut catalog = ConfigCatalog::new();
    if let Some(dir) = &config.server.configs_dir {
        let loaded = load_custom_configs(dir, &mut catalog).await;
        tracing::info!(loaded, dir = %dir.display(), "Custom automation configs loaded");
    }
    catalog
}

async fn list_configs(path: &Path) -> Result<()> {
    let config = ServerConfig::read(path).await;
    let catalog = load_catalog(&config).await;

    println!("Automation configurations ({}):", catalog.len());
    for (name, description) in catalog.list() {
        println!("  {:<24} {}", name, description);
    }

    Ok(())
}

async fn serve(path: &Path, port: Option<u16>, agent_url: Option<String>) -> Result<()> {
    init_tracing();

    let mut config = ServerConfig::read(path).await;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(agent_url) = agent_url {
        config.server.agent_url = agent_url;
    }

    let catalog = load_catalog(&config).await;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(agent_url = %config.server.agent_url, "Browser agent");

    let state = AppState::new(config).with_configs(catalog);
    let _sweeper = state.start_cache_sweeper();
    let registry = state.registry.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local = listener.local_addr()?;

    println!();
    println!("Automation Studio");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://{}", local);
    println!("  Swagger UI:  http://{}/swagger-ui", local);
    println!("  Events:      http://{}/api/events", local);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    Ok(())
}

async fn shutdown_signal(registry: TaskRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    registry.shutdown();
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
