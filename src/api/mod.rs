pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        .route("/auth/logout", post(handlers::auth::logout))

        .nest("/api", api_routes(app_state.clone()))
        .nest("/admin", admin_routes(app_state.clone()))

        .with_state(app_state)

        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/bookings", booking_routes(state.clone()))
        .nest("/payments", payment_routes(state.clone()))
        .nest("/tutors", tutor_routes(state))
}

fn booking_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::bookings::list).post(handlers::bookings::create))
        .route("/:id", get(handlers::bookings::get))
        .route("/:id/confirm", post(handlers::bookings::confirm))
        .route("/:id/cancel", post(handlers::bookings::cancel))
        .route("/:id/complete", post(handlers::bookings::complete))
        .route("/:id/payments", post(handlers::bookings::initiate_payment))
        .route("/:id/review", post(handlers::bookings::review))
        .route("/:id/meeting", post(handlers::bookings::create_meeting))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_actor,
        ))
}

fn payment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/:id", get(handlers::payments::get))
        .route("/:id/check-status", post(handlers::payments::check_status))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_actor,
        ))
        // Gateway callback: no actor, added after the auth layer
        .route("/mpesa/callback", post(handlers::payments::mpesa_callback))
}

fn tutor_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/recommended", get(handlers::tutors::recommended))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_actor,
        ))
        // Public directory
        .route("/search", get(handlers::tutors::search))
        .route("/:id", get(handlers::tutors::profile))
        .route("/:id/availability", get(handlers::tutors::availability))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/payments/:id/refund", post(handlers::admin::refund))
        .route("/payments/reconcile-stale", post(handlers::admin::reconcile_stale))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_admin,
        ))
}
