pub mod cloud;
pub mod config;
pub mod config_manager;
pub mod error;
pub mod handlers;
pub mod pages;
pub mod routes;
pub mod session;
pub mod state;
pub mod validation;
pub mod voice_api;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Full HTTP application: API routes, optional dashboard assets, tracing and CORS.
pub fn app(state: AppState) -> Router {
    let mut router = routes::create_routes();
    if let Some(dir) = &state.config.static_dir {
        tracing::info!("Serving dashboard assets from {}", dir);
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
