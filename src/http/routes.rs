use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Multipart framing on top of the largest accepted payload
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let body_limit = state
        .limits
        .chunk_max_bytes
        .max(state.limits.transcribe_max_bytes)
        + MULTIPART_OVERHEAD;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session continuity
        .route("/start-session", post(handlers::start_session))
        .route("/pause-session", post(handlers::pause_session))
        .route("/resume-session", post(handlers::resume_session))
        .route("/check-session", get(handlers::check_session))
        .route("/complete-session", post(handlers::complete_session))
        .route("/submit-response", post(handlers::submit_response))
        .route("/submit-screener", post(handlers::submit_screener))
        // Chunked media
        .route("/videos/start-session", post(handlers::start_upload))
        .route("/videos/upload-chunk", post(handlers::upload_chunk))
        .route("/videos/finalize", post(handlers::finalize_upload))
        // Speech
        .route("/ai/synthesize", post(handlers::synthesize))
        .route("/ai/transcribe", post(handlers::transcribe));

    // Assembled media, when not served by a CDN or proxy
    if let Some(dir) = &state.media_dir {
        router = router.nest_service("/media", ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                // Add tracing middleware for request logging
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .map_response(|res: axum::response::Response<_>| res.map(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
        .with_state(state)
}
