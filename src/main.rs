use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use comfyui_nodes::{api, config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config::Config::dotenv_load();
    let config = config::Config::new();
    config::Config::log_env_vars();

    let state = Arc::new(api::routes::AppState::new(config.credential()));
    let app = api::routes::router(state.clone());

    let ip: std::net::IpAddr = config.api_host.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_HOST '{}', falling back to 127.0.0.1", config.api_host);
        std::net::IpAddr::from([127, 0, 0, 1])
    });
    let port: u16 = config.api_port.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_PORT '{}', falling back to 8189", config.api_port);
        8189
    });
    let socket_address = SocketAddr::new(ip, port);
    tracing::info!("listening on {}", socket_address);

    let server = axum::Server::bind(&socket_address)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        });
    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }

    let mut triggers = state.triggers.write().await;
    for (id, mut slot) in triggers.drain() {
        tracing::info!(trigger_id = %id, "Deactivating trigger on shutdown");
        slot.handle.deactivate().await;
    }
}
