use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::main_lib::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        service: "vnquote-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
