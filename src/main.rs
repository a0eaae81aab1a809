mod error;
mod adapters;
mod bootstrap;
mod config;
mod fee_engine;
mod job;
mod ledger;
mod models;
mod notification;
mod pricing;
mod schedule;
mod store;
#[cfg(test)]
mod testing;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,minimum_fee_job=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting Minimum Fee Job");

    // Load configuration
    dotenv::dotenv().ok();
    let config = AppConfig::load()?;

    let scheduler = bootstrap::initialize_scheduler(config)?;

    // Runs until the process is stopped
    scheduler.start().await?;

    Ok(())
}
