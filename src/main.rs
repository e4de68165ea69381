mod command;
mod config;
mod connection;
mod driver;
mod session;
mod store;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use config::ServerConfig;
use connection::SessionRegistry;
use driver::WebDriverFactory;
use session::ExecutionContext;
use std::sync::Arc;
use store::SqliteStore;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ServerConfig::parse();

    info!("steprunner starting");
    info!("  WebDriver: {} (headless: {})", config.webdriver_url, config.headless);
    info!("  Database: {}", config.database.display());
    if let Some(dir) = &config.screenshot_dir {
        info!("  Screenshots: {}", dir.display());
    }

    let store = SqliteStore::new(&config.database)
        .with_context(|| format!("failed to open {}", config.database.display()))?;
    let factory = WebDriverFactory::new(config.webdriver()).context("failed to build WebDriver client")?;

    let ctx = Arc::new(ExecutionContext::new(
        Arc::new(store),
        Arc::new(factory),
        config.timeout_policy(),
        config.reconciler(),
    ));
    let registry = SessionRegistry::new(ctx.clone());

    transport::serve(&config.bind, registry, config.event_buffer).await?;

    info!("Shutting down, flushing pending step results");
    ctx.reconciler.flush().await;
    Ok(())
}
