pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        // Payment routes
        .nest("/api/payments", payment_routes(app_state.clone()))
        // Add state to the router
        .with_state(app_state)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn payment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Public webhook ingress, one per provider (no auth; see handlers)
        .route("/webhooks/mollie", post(handlers::webhooks::mollie_webhook))
        .route("/webhooks/stripe", post(handlers::webhooks::stripe_webhook))
        .route("/webhooks/paypal", post(handlers::webhooks::paypal_webhook))
        // Protected payment endpoints
        .merge(
            Router::new()
                .route("/checkout", post(handlers::payments::create_checkout))
                .route(
                    "/status/:club_id/:participant_id",
                    get(handlers::payments::poll_status),
                )
                .route(
                    "/registration/:club_id/:participant_id",
                    get(handlers::payments::get_registration),
                )
                .route_layer(axum::middleware::from_fn_with_state(
                    state,
                    middleware::auth::require_auth,
                )),
        )
}
