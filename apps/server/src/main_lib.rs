//! Tracing setup and application state wiring. Grounded on the teacher's
//! `main_lib.rs` (`init_tracing()` env-driven format switch,
//! `build_state()` pool/migrations/writer sequencing), generalized down
//! to this service's single `AppContext`.

use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use vnquote_core::{AppContext, CoreConfig, SystemClock};
use vnquote_market_data::HttpMarketProvider;
use vnquote_storage_sqlite::{create_pool, run_migrations, spawn_writer, SqliteAssetCatalog, SqliteHistoricalStore, SqlitePersistentQuoteCache, SqlitePersistentSearchCache};

use crate::config::Config;

pub type AppState = AppContext;

pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json().with_current_span(false)).init();
    } else {
        registry.with(fmt::layer().with_target(true).with_line_number(true)).init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let pool = create_pool(&config.db_path)?;
    run_migrations(&pool)?;
    let writer = spawn_writer((*pool).clone());

    let store = Arc::new(SqliteHistoricalStore::new(pool.clone(), writer.clone()));
    let asset_catalog = Arc::new(SqliteAssetCatalog::new(pool.clone(), writer.clone()));
    let persistent_quote_cache = Arc::new(SqlitePersistentQuoteCache::new(pool.clone(), writer.clone()));
    let persistent_search_cache = Arc::new(SqlitePersistentSearchCache::new(pool.clone(), writer));

    let provider = Arc::new(HttpMarketProvider::new(config.provider_base_url.clone())?);
    let clock = Arc::new(SystemClock);

    let context = AppContext::build(
        provider,
        store,
        asset_catalog,
        persistent_quote_cache,
        persistent_search_cache,
        clock,
        CoreConfig::default(),
    );

    context.maintenance.clone().spawn();

    Ok(context)
}
