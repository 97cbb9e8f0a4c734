use vnquote_server::api;
use vnquote_server::config::Config;
use vnquote_server::main_lib::{build_state, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config);

    let state = build_state(&config).await?;
    let router = api::app_router(state, &config);

    tracing::info!("listening on {}", config.listen_addr());
    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
