use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use vnquote_core::AssetType;
use vnquote_market_data::sjc;

use crate::api::dto::{build_history_response, resolve_history_range, HistoryRangeQuery, HistoryResponse};
use crate::error::ApiResult;
use crate::main_lib::AppState;

async fn infer_asset_type(state: &AppState, symbol: &str) -> AssetType {
    if sjc::is_gold_symbol(symbol) {
        return AssetType::Gold;
    }
    match state.asset_catalog.get(symbol).await {
        Ok(Some(asset)) => asset.asset_type,
        _ => AssetType::Stock,
    }
}

async fn history_for(state: &Arc<AppState>, symbol: &str, asset_type: AssetType, query: HistoryRangeQuery) -> ApiResult<Json<HistoryResponse>> {
    let today = state.clock.today();
    let (start, end) = resolve_history_range(&query, today)?;
    let records = state.historical.get_history(symbol, asset_type, start, end, None).await?;
    Ok(Json(build_history_response(symbol, asset_type, state.provider.id(), &records)))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryRangeQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let asset_type = infer_asset_type(&state, &symbol).await;
    history_for(&state, &symbol, asset_type, query).await
}

async fn get_stock_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryRangeQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    history_for(&state, &symbol, AssetType::Stock, query).await
}

async fn get_fund_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryRangeQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    history_for(&state, &symbol, AssetType::Fund, query).await
}

async fn get_index_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryRangeQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    history_for(&state, &symbol, AssetType::Index, query).await
}

async fn get_gold_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryRangeQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    history_for(&state, &symbol, AssetType::Gold, query).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/history/{symbol}", get(get_history))
        .route("/stocks/{symbol}/history", get(get_stock_history))
        .route("/funds/{symbol}/history", get(get_fund_history))
        .route("/indices/{symbol}/history", get(get_index_history))
        .route("/gold/{symbol}/history", get(get_gold_history))
}
