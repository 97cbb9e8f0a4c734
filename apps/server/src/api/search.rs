use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use vnquote_core::{CoreError, SearchHit};

use crate::error::ApiResult;
use crate::main_lib::AppState;

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
    total: usize,
}

async fn search(State(state): State<Arc<AppState>>, Query(params): Query<SearchQuery>) -> ApiResult<Json<SearchResponse>> {
    let results = state.search.search(&params.query, params.limit).await?;
    Ok(Json(SearchResponse { total: results.len(), results }))
}

async fn search_one(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> ApiResult<Json<SearchHit>> {
    if let Some(asset) = state.asset_catalog.get(&symbol).await? {
        return Ok(Json(SearchHit {
            symbol: asset.symbol,
            name: asset.name,
            asset_type: asset.asset_type,
            asset_class: asset.asset_class,
            asset_sub_class: asset.asset_sub_class,
            exchange: asset.exchange,
            currency: asset.currency,
            data_source: asset.data_source,
        }));
    }

    let hits = state.search.search(&symbol, Some(1)).await?;
    let exact = hits.into_iter().find(|h| h.symbol.eq_ignore_ascii_case(&symbol));
    match exact {
        Some(hit) => Ok(Json(hit)),
        None => Err(CoreError::NotFound(symbol).into()),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(search))
        .route("/search/{symbol}", get(search_one))
}
