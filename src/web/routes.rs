//! Web API router construction.

use std::time::Duration;

use axum::{
    Router,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::web::error::ApiError;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{options, query, status};

/// Creates the web server router
pub fn create_router(app_state: AppState, request_timeout: Duration) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/options/{kind}", get(options::get_options))
        .route("/query", post(query::query))
        .route("/refresh", get(query::refresh))
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router)
        .fallback(not_found)
        .layer((
            // Outermost: per-request ID span + severity-proportional response logging.
            RequestIdLayer,
            CorsLayer::permissive(),
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            axum::middleware::map_response(timeout_as_json),
            // A full scrape can take minutes; this bounds it.
            TimeoutLayer::new(request_timeout),
        ))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("no route for {}", uri.path()))
}

/// `TimeoutLayer` answers with a bare 408; give it the usual `{error}` body.
async fn timeout_as_json(resp: Response) -> Response {
    if resp.status() != StatusCode::REQUEST_TIMEOUT {
        return resp;
    }
    ApiError::new(StatusCode::GATEWAY_TIMEOUT, "request timed out").into_response()
}
