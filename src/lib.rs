pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod session;
pub mod stt;
pub mod tts;

use crate::handlers::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub fn create_app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_request_size = app_state.config.max_request_size_bytes();

    Router::new()
        .route("/", get(handlers::index))
        .route("/agent/chat/{session_id}", post(handlers::chat_with_session))
        .route(
            "/agent/chat/{session_id}/history",
            get(handlers::session_history),
        )
        .route("/agent/chat/{session_id}", delete(handlers::clear_session))
        .route("/agent/stats", get(handlers::agent_stats))
        .route("/llm/query", post(handlers::llm_query))
        .route("/stt/transcribe", post(handlers::transcribe_audio))
        .route("/tts/generate", post(handlers::generate_audio))
        .route("/health", get(handlers::health_check))
        .route("/api/info", get(handlers::api_info))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}
