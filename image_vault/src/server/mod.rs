//! HTTP surface: JSON REST API plus the static frontend.

pub mod error;
pub mod handlers;
pub mod state;

use std::path::Path;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::VaultConfig;
use crate::storage::ImageStore;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Build the full axum Router with all routes and middleware.
///
/// Anything outside `/api` is served from `public_dir`.
pub fn build_router(state: AppState, public_dir: &Path, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let image_routes = Router::new()
        .route("/api/images", get(handlers::list_images))
        .route("/api/images/{id}", delete(handlers::delete_image))
        .route("/api/images/{id}/tags", post(handlers::update_tags))
        .route("/api/images/{id}/download", post(handlers::download_image))
        .route("/api/encrypt", post(handlers::encrypt_image))
        .route("/api/decrypt/{id}", post(handlers::decrypt_image))
        .route("/api/thumbnail/{id}", post(handlers::thumbnail));

    let album_routes = Router::new()
        .route("/api/albums", get(handlers::list_albums))
        .route("/api/albums/{album}/images", get(handlers::album_images));

    Router::new()
        .merge(image_routes)
        .merge(album_routes)
        .fallback_service(ServeDir::new(public_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store, bind and serve until Ctrl-C
pub async fn serve(config: &VaultConfig) -> anyhow::Result<()> {
    let store = ImageStore::open(&config.storage_dir)?;
    let state = AppState::new(store, config.min_passphrase_len);
    let app = build_router(state, &config.public_dir, config.max_upload_bytes());

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %addr,
        storage = %config.storage_dir.display(),
        "image vault listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
