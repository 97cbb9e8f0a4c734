//! Route composition: one module per concern, merged into a single
//! router and handed the shared [`AppState`]. Grounded on the teacher's
//! `api::app_router` merge-of-per-module-routers pattern. utoipa /
//! utoipa-swagger-ui are deliberately not wired in here — see DESIGN.md.

pub mod admin;
pub mod dto;
pub mod health;
pub mod history;
pub mod quote;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::main_lib::AppState;

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = if config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(health::router())
        .merge(search::router())
        .merge(quote::router())
        .merge(history::router())
        .merge(admin::router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .with_state(state)
}
