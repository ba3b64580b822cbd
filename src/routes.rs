use crate::dealer_handler;
use crate::handlers::{self, AppState};
use crate::rate_limiter::enforce_rate_limit;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request size limit: 1MB max payload.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Every route except `/health`, with the onboarding limiter applied.
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let onboarding = Router::new()
        .route("/dealers/onboard", post(dealer_handler::onboard))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.onboarding_limiter),
            enforce_rate_limit,
        ));

    Router::new()
        .route("/chat", post(handlers::chat))
        .route(
            "/chat/history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route("/email/send-email", post(handlers::send_email))
        .route(
            "/dealers/applications",
            get(dealer_handler::list_applications),
        )
        .route(
            "/dealers/applications/:id/approve",
            post(dealer_handler::approve_application),
        )
        .route(
            "/dealers/applications/:id/reject",
            post(dealer_handler::reject_application),
        )
        .merge(onboarding)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}

/// Complete router without the per-IP burst limiter or CORS, which `main`
/// adds around the API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes(&state))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
