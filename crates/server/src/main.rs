use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use cadlink_host::bridge::ExecutionBridge;
use cadlink_host::config::HostConfig;
use cadlink_host::context::{spawn_host, HostContext};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

mod routes;
mod tcp;

#[derive(Clone)]
pub struct AppState {
    pub bridge: ExecutionBridge<HostContext>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadlink_host=info,cadlink_server=info".into()),
        )
        .init();

    let config = HostConfig::load().context("Failed to load configuration")?;
    let host = spawn_host(config.clone())?;
    let state = AppState {
        bridge: host.bridge().clone(),
    };

    let tcp_listener = TcpListener::bind(&config.server.tcp_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.tcp_addr))?;
    tracing::info!("Tool socket listening on {}", config.server.tcp_addr);
    let tcp_task = tokio::spawn(tcp::serve(
        tcp_listener,
        state.bridge.clone(),
        tcp::Limits::from(&config.server),
    ));

    let app = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/tools", get(routes::list_tools))
        .route("/api/tool", post(routes::call_tool))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let http_listener = TcpListener::bind(&config.server.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.http_addr))?;
    tracing::info!("Server running on http://{}", config.server.http_addr);
    axum::serve(http_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tcp_task.abort();
    tokio::task::spawn_blocking(move || host.shutdown())
        .await
        .context("Host shutdown task failed")??;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {e}");
    }
}
