use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{Payment, RefundRequest},
    error::Result,
    service::StaleSweep,
};

pub async fn refund(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let refund = state
        .service_context
        .payment_service
        .refund(&current.user, id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn reconcile_stale(State(state): State<AppState>) -> Result<Json<StaleSweep>> {
    let sweep = state
        .service_context
        .payment_service
        .reconcile_stale(Utc::now())
        .await?;

    Ok(Json(sweep))
}
