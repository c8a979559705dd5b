pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::{ApiState, EventCallback, HostedService};

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/dump", get(handlers::handle_dump))
        .route("/apps", get(handlers::handle_apps))
        .route("/events", get(handlers::handle_events))
        .route("/profiles/{profile}/devices", get(handlers::handle_devices))
        .route(
            "/profiles/{profile}/devices/{addr}",
            get(handlers::handle_device),
        )
        .route(
            "/profiles/{profile}/devices/{addr}/connect",
            post(handlers::handle_connect),
        )
        .route(
            "/profiles/{profile}/devices/{addr}/disconnect",
            post(handlers::handle_disconnect),
        )
        .route(
            "/profiles/{profile}/devices/{addr}/policy",
            post(handlers::handle_policy),
        )
        .route("/bond/{addr}", post(handlers::handle_bond))
        .route(
            "/native/{profile}/{addr}/incoming",
            post(handlers::handle_native_incoming),
        )
        .route(
            "/native/{profile}/{addr}/drop",
            post(handlers::handle_native_drop),
        )
        .route(
            "/native/{profile}/{addr}/data",
            post(handlers::handle_native_data),
        )
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the API on 127.0.0.1 until the shutdown broadcast fires.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown_tx.subscribe();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
