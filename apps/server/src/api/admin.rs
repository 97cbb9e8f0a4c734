use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};

use vnquote_core::{GoldSeeder, SeedProgress};

use crate::error::ApiResult;
use crate::main_lib::AppState;

#[derive(Serialize)]
struct CacheStats {
    quote_cache_len: usize,
    quote_cache_hits: u64,
    quote_cache_misses: u64,
    search_cache_len: usize,
    search_cache_hits: u64,
    search_cache_misses: u64,
    active_lazy_fetch_tasks: usize,
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    let (quote_hits, quote_misses) = state.quotes.cache_stats();
    let (search_hits, search_misses) = state.search.cache_stats();
    Json(CacheStats {
        quote_cache_len: state.quotes.cache_len(),
        quote_cache_hits: quote_hits,
        quote_cache_misses: quote_misses,
        search_cache_len: state.search.cache_len(),
        search_cache_hits: search_hits,
        search_cache_misses: search_misses,
        active_lazy_fetch_tasks: state.lazy_fetch.active_count(),
    })
}

#[derive(Serialize)]
struct CleanupResult {
    placeholders_removed: usize,
    quote_cache_entries_removed: usize,
    search_cache_entries_removed: usize,
}

async fn cache_cleanup(State(state): State<Arc<AppState>>) -> ApiResult<Json<CleanupResult>> {
    let now = state.clock.now();
    let placeholders_removed = state.store.delete_placeholders_older_than(now - ChronoDuration::days(90)).await?;
    let quote_cache_entries_removed = state.quotes.cleanup_expired_cache();
    let search_cache_entries_removed = state.search.cleanup_expired_cache();
    Ok(Json(CleanupResult {
        placeholders_removed,
        quote_cache_entries_removed,
        search_cache_entries_removed,
    }))
}

#[derive(Deserialize)]
struct SeedQuery {
    #[serde(default)]
    force_refresh: bool,
}

async fn cache_seed(State(state): State<Arc<AppState>>, Query(query): Query<SeedQuery>) -> ApiResult<Json<SeedProgress>> {
    let progress = state.seeder.seed_if_needed(query.force_refresh).await?;
    Ok(Json(progress))
}

async fn seed_progress(State(state): State<Arc<AppState>>) -> Json<SeedProgress> {
    Json(state.seeder.progress())
}

#[derive(Deserialize)]
struct LazyFetchStatusQuery {
    symbol: String,
}

#[derive(Serialize)]
struct LazyFetchStatusResponse {
    symbol: String,
    status: Option<String>,
    total_chunks: usize,
    completed_chunks: usize,
}

async fn lazy_fetch_status(State(state): State<Arc<AppState>>, Query(query): Query<LazyFetchStatusQuery>) -> Json<LazyFetchStatusResponse> {
    let today = state.clock.today();
    let window_start = today - ChronoDuration::days(365);
    let status = state.lazy_fetch.status(&query.symbol, window_start, today);
    Json(LazyFetchStatusResponse {
        symbol: query.symbol.to_uppercase(),
        status: status.as_ref().map(|s| format!("{:?}", s.state)),
        total_chunks: status.as_ref().map(|s| s.total_chunks).unwrap_or(0),
        completed_chunks: status.as_ref().map(|s| s.completed_chunks).unwrap_or(0),
    })
}

#[derive(Serialize)]
struct GoldSeedResult {
    rows_written: usize,
}

async fn gold_seed(State(state): State<Arc<AppState>>) -> ApiResult<Json<GoldSeedResult>> {
    let seeder = GoldSeeder::new(state.store.clone(), state.provider.clone(), state.clock.clone());
    let default_start = state.clock.today() - ChronoDuration::days(365);
    seeder.run(default_start).await?;
    Ok(Json(GoldSeedResult { rows_written: seeder.rows_written() }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cache/stats", get(cache_stats))
        .route("/cache/cleanup", post(cache_cleanup))
        .route("/cache/seed", post(cache_seed))
        .route("/cache/seed/progress", get(seed_progress))
        .route("/cache/lazy-fetch/status", get(lazy_fetch_status))
        .route("/gold/seed", post(gold_seed))
}
