//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use axum::{
    routing::{get, patch, post},
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
/// - WebSocket at `/ws` (one form-fill session per connection)
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: AppState) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        // configurations
        .route("/api/v1/config/active", get(http::http_get_active_config))
        .route("/api/v1/config/validate", post(http::http_validate_config))
        .route("/api/v1/config/preview", post(http::http_preview_config))
        .route("/api/v1/config", post(http::http_save_config))
        // presets
        .route("/api/v1/presets", get(http::http_list_presets).post(http::http_save_preset))
        .route(
            "/api/v1/presets/:id",
            get(http::http_load_preset)
                .patch(http::http_update_preset_metadata)
                .delete(http::http_delete_preset),
        )
        .route("/api/v1/presets/:id/activate", post(http::http_activate_preset))
        // taxonomy admin
        .route("/api/v1/categories", get(http::http_list_categories).post(http::http_add_category))
        .route(
            "/api/v1/categories/:id",
            patch(http::http_update_category).delete(http::http_delete_category),
        )
        .route("/api/v1/categories/reorder", post(http::http_reorder_categories))
        .route("/api/v1/categories/:id/toggle", post(http::http_toggle_category))
        .route("/api/v1/study-fields", get(http::http_list_study_fields).post(http::http_add_study_field))
        .route(
            "/api/v1/study-fields/:id",
            patch(http::http_update_study_field).delete(http::http_delete_study_field),
        )
        .route("/api/v1/study-fields/:id/toggle", post(http::http_toggle_study_field))
        .route("/api/v1/study-fields/detect", post(http::http_detect_study_field))
        // background selections
        .route(
            "/api/v1/background-selection",
            post(http::http_upsert_background_selection),
        )
        .route(
            "/api/v1/background-selection/:user_id",
            get(http::http_get_background_selection).delete(http::http_delete_background_selection),
        )
        // form-fill sessions
        .route("/api/v1/session", post(http::http_open_session))
        .route("/api/v1/session/field-change", post(http::http_field_change))
        .route("/api/v1/session/completion", get(http::http_completion))
        .route("/api/v1/session/section-completion", get(http::http_section_completion))
        .route("/api/v1/session/readiness", get(http::http_readiness))
        .route("/api/v1/session/state", get(http::http_session_state))
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
