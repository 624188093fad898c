use std::sync::Arc;

use anyhow::Context;

use crate::api::AppState;
use crate::config::Config;
use crate::db::Store;
use crate::notify::Notifier;
use crate::registry::Registry;
use crate::storage::ContentStore;

/// Shared HTTP client for webhook delivery. Reused so connections pool.
fn build_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .user_agent(concat!("Hoard/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Open storage, load the caches and wire the service graph.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let content = ContentStore::new(&config.uploads.uploads_path, &config.uploads.archive_path);
    content.ensure_dirs().await?;

    let notifier = Notifier::new(&config.webhooks, build_http_client()?);

    let registry = Registry::load(store, content, notifier, config.clone()).await?;

    Ok(AppState {
        registry: Arc::new(registry),
        config: Arc::new(config),
    })
}
