use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{AppState, middleware::log_errors};

pub mod health;
pub mod location;

/// Full application router: location routes nested under the configured
/// base URI, plus `/health` at the root.
pub fn router(state: AppState) -> Router {
    let locations = Router::new()
        .route("/locations/checkin", post(location::check_in))
        .route("/locations/user", get(location::find_user))
        .route("/locations/venue", get(location::find_venue_users));

    // axum refuses to nest at "/", so an empty or root base merges instead.
    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base.is_empty() {
        Router::new().merge(locations)
    } else {
        Router::new().nest(&base, locations)
    };

    let router = router.route("/health", get(health::health)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(log_errors)),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding permissive CORS layer for development");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
