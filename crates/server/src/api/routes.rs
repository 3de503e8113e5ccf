use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{convert, handlers, media};
use crate::state::AppState;

/// Largest accepted request body. Uploads beyond this are rejected before
/// they reach the handler.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Conversion
        .route("/convert", post(convert::convert_audio_file))
        .route("/convert/check", get(convert::check))
        // Media
        .route("/media/file/{file_id}/{filename}", get(media::get_file))
        .route("/media/describe/{file_id}", get(media::describe))
        .route("/media/recents", get(media::recents))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::RETRY_AFTER])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
