//! keel Scheduler
//!
//! Binary entry point: wires the offer matcher manager, the admission
//! gate, and the management API together.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keel_clock::SystemClock;
use keel_scheduler::api;
use keel_scheduler::api::admission::ConcurrencyGate;
use keel_scheduler::config::Config;
use keel_scheduler::matcher::manager::{ManagerConfig, OfferMatcherManager};
use keel_scheduler::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting keel scheduler");

    // Load configuration
    let config = Config::from_env()?;
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    // Spawn the offer matcher manager
    let (manager, _manager_ref) = OfferMatcherManager::spawn(
        ManagerConfig {
            max_tasks_per_offer: config.max_tasks_per_offer,
            mailbox_size: config.mailbox_size,
        },
        Arc::new(SystemClock),
    );

    if config.initial_launch_tokens > 0 {
        manager.set_launch_tokens(config.initial_launch_tokens).await?;
    }

    // Surface wanted-offers transitions to the offer source integration.
    let mut offers_wanted = manager.offers_wanted();
    tokio::spawn(async move {
        while offers_wanted.changed().await.is_ok() {
            let wanted = *offers_wanted.borrow_and_update();
            info!(wanted, "Offers-wanted signal");
        }
    });

    // Build and run the server
    let admission = ConcurrencyGate::new(config.concurrent_requests, config.request_wait);
    let state = AppState::new(manager, admission);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app).await?;

    Ok(())
}
