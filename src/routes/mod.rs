//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: AppState) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Paths and progress
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/paths", get(http::http_list_paths))
        .route(
            "/api/v1/paths/:path_id",
            get(http::http_get_path).put(http::http_put_path).delete(http::http_delete_path),
        )
        .route("/api/v1/paths/:path_id/nodes", post(http::http_insert_node))
        .route("/api/v1/paths/:path_id/progress", get(http::http_get_progress))
        .route("/api/v1/paths/:path_id/expansion", post(http::http_post_expansion))
        .route("/api/v1/paths/:path_id/nodes/:node_id/status", get(http::http_get_status))
        .route("/api/v1/paths/:path_id/nodes/:node_id/challenge", post(http::http_open_challenge))
        .route("/api/v1/expansion", get(http::http_compare_expansion))
        // Challenge sessions
        .route(
            "/api/v1/challenges/:challenge_id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/challenges/:challenge_id/hint", post(http::http_post_hint))
        .route("/api/v1/challenges/:challenge_id/submit", post(http::http_post_submit))
        .route("/api/v1/challenges/:challenge_id/retry", post(http::http_post_retry))
        .route("/api/v1/challenges/:challenge_id/attempts", get(http::http_get_attempts))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
