use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::*;
use crate::pages::MAX_UPLOAD_BYTES;
use crate::state::AppState;

/// Request body ceiling for uploads and for configuration imports, which
/// carry decoded knowledge documents.
pub const MAX_REQUEST_BYTES: usize = 4 * MAX_UPLOAD_BYTES;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/api/health", get(health_check))
        .route("/api/pages", get(list_pages))
        // Session lifecycle
        .route("/api/sessions/:sid", get(get_session).delete(delete_session))
        .route("/api/sessions/:sid/api-key", put(set_api_key))
        // Configuration store
        .route("/api/sessions/:sid/config", get(get_config))
        .route("/api/sessions/:sid/config/reset", post(reset_config))
        .route("/api/sessions/:sid/config/export", get(export_configuration))
        .route(
            "/api/sessions/:sid/config/import",
            post(import_configuration).layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES)),
        )
        .route(
            "/api/sessions/:sid/config/:key",
            get(get_config_value).put(set_config_value),
        )
        // Feature pages
        .route(
            "/api/sessions/:sid/pages/:page",
            get(render_page).post(submit_page),
        )
        .route(
            "/api/sessions/:sid/uploads/:kind",
            post(upload).layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES)),
        )
}
