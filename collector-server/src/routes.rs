use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{get_collector_state, run_collector};
use crate::state::AppState;

/// `:run` is a literal method-style suffix (Google API design style), not
/// a path parameter — matchit can't mix a dynamic segment with a literal
/// suffix in one piece, so the whole `{collector}:run` segment is
/// captured as one param and split on `:` inside the handler.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/collectors/:collector_action", post(run_collector))
        .route("/v1/collectors/:collector/state", get(get_collector_state))
        // Outermost: CORS, then request tracing.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
