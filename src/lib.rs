pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod image;
pub mod keygen;
pub mod models;
pub mod notify;
pub mod perms;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod storage;

use std::sync::Arc;

pub use config::Config;
use scheduler::Scheduler;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Hoard v{} starting...", env!("CARGO_PKG_VERSION"));

    let state = state::build_state(config.clone()).await?;

    let scheduler_handle = if config.uploads.archive_enabled {
        let scheduler = Scheduler::new(
            Arc::clone(&state.registry),
            config.uploads.archive_purge_cron.clone(),
        );
        Some(scheduler.start().await?)
    } else {
        None
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Serving at http://{addr}");

    let app = api::router(state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {e}");
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    server_handle.abort();
    if let Some(mut sched) = scheduler_handle {
        let _ = sched.shutdown().await;
    }
    info!("Stopped");

    Ok(())
}
