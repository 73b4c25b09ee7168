use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Tutorbook API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Tutoring marketplace bookings and payments",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "bookings": "/api/bookings",
            "payments": "/api/payments",
            "tutors": "/api/tutors/recommended",
            "admin": "/admin"
        }
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1")
        .execute(&state.service_context.db_pool)
        .await
        .is_ok();

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "healthy" } else { "degraded" },
            "database": database,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}
