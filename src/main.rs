//! modelrelay server and discovery CLI
//!
//! `serve` (the default) starts the Axum tool server; `models` prints a
//! discovery summary of free and cheap models; `config` writes a template.

use clap::Parser;
use modelrelay::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    models::{
        CatalogCache, DiscoveryFilter, OpenRouterClient,
        discovery::{clamp_limit, format_summary},
    },
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config).await,
        Command::Models {
            free_only,
            max_prompt,
            vision,
            search,
            limit,
        } => {
            let filter = DiscoveryFilter {
                free_only,
                max_prompt,
                vision_only: vision,
                search,
                limit: clamp_limit(limit),
            };
            list_models(&cli.config, filter).await
        }
        Command::Config { output } => write_config_template(output.as_deref()),
    }
}

async fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(Config::load(config_path)?);

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting modelrelay server on {}:{}",
        config.server.host,
        config.server.port
    );

    let state = AppState::new(config.clone())?;
    let app = handlers::app(state);

    let ip = config.server.host.parse::<std::net::IpAddr>().map_err(|e| {
        format!(
            "server.host '{}' is not a valid IP address: {}",
            config.server.host, e
        )
    })?;
    let addr = SocketAddr::from((ip, config.server.port));

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn list_models(
    config_path: &str,
    filter: DiscoveryFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;

    // Keep stdout for the summary
    telemetry::init("warn");

    let client = Arc::new(OpenRouterClient::new(
        &config.upstream,
        config.request_timeout(),
    )?);
    let cache = CatalogCache::new(client);
    let catalog = cache.get_catalog().await?;

    let models = filter.apply(&catalog);

    if models.is_empty() {
        println!("No models found for the given criteria.");
    } else {
        println!("{}", format_summary(&models, &filter));
    }
    Ok(())
}

fn write_config_template(output: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let template = generate_config_template();
    match output {
        Some(path) => {
            std::fs::write(path, template)
                .map_err(|e| format!("Failed to write config template to {}: {}", path, e))?;
            eprintln!("Configuration template written to {}", path);
        }
        None => print!("{}", template),
    }
    Ok(())
}
