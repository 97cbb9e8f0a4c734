use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use vnquote_core::AssetType;
use vnquote_market_data::sjc;

use crate::api::dto::QuoteResponse;
use crate::error::ApiResult;
use crate::main_lib::AppState;

/// Resolve the asset type for the untyped `/quote/{symbol}` route: gold
/// symbols are recognized by suffix, everything else falls back to the
/// asset catalog, defaulting to `Stock` when the symbol is unknown.
async fn infer_asset_type(state: &AppState, symbol: &str) -> AssetType {
    if sjc::is_gold_symbol(symbol) {
        return AssetType::Gold;
    }
    match state.asset_catalog.get(symbol).await {
        Ok(Some(asset)) => asset.asset_type,
        _ => AssetType::Stock,
    }
}

async fn quote_for(state: &Arc<AppState>, symbol: &str, asset_type: AssetType) -> ApiResult<Json<QuoteResponse>> {
    let (storage_symbol, is_chi) = if asset_type == AssetType::Gold {
        sjc::canonicalize_gold_symbol(symbol)
    } else {
        (symbol, false)
    };

    let mut quote = state.quotes.get_quote(storage_symbol, asset_type).await?;
    if is_chi {
        quote.open = quote.open.map(sjc::to_chi_unit);
        quote.high = quote.high.map(sjc::to_chi_unit);
        quote.low = quote.low.map(sjc::to_chi_unit);
        quote.close = quote.close.map(sjc::to_chi_unit);
        quote.adjclose = quote.adjclose.map(sjc::to_chi_unit);
        quote.buy_price = quote.buy_price.map(sjc::to_chi_unit);
        quote.sell_price = quote.sell_price.map(sjc::to_chi_unit);
    }
    quote.symbol = symbol.to_uppercase();

    Ok(Json(quote.into()))
}

async fn get_quote(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> ApiResult<Json<QuoteResponse>> {
    let asset_type = infer_asset_type(&state, &symbol).await;
    quote_for(&state, &symbol, asset_type).await
}

async fn get_stock_quote(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> ApiResult<Json<QuoteResponse>> {
    quote_for(&state, &symbol, AssetType::Stock).await
}

async fn get_fund_quote(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> ApiResult<Json<QuoteResponse>> {
    quote_for(&state, &symbol, AssetType::Fund).await
}

async fn get_index_quote(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> ApiResult<Json<QuoteResponse>> {
    quote_for(&state, &symbol, AssetType::Index).await
}

async fn get_gold_quote(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> ApiResult<Json<QuoteResponse>> {
    quote_for(&state, &symbol, AssetType::Gold).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quote/{symbol}", get(get_quote))
        .route("/stocks/{symbol}/quote", get(get_stock_quote))
        .route("/funds/{symbol}/quote", get(get_fund_quote))
        .route("/indices/{symbol}/quote", get(get_index_quote))
        .route("/gold/{symbol}/quote", get(get_gold_quote))
}
