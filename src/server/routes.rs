use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::server::{auth, handlers, state::AppState};

/// `/health` is open; `/generate_speech` sits behind the credential check.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/generate_speech", post(handlers::generate_speech))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_credentials,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
