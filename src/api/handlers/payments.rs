use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::Payment,
    error::Result,
    payments::{mpesa, CallbackAck},
};

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let payment = state
        .service_context
        .payment_service
        .get_for(&current.user, id)
        .await?;

    Ok(Json(payment))
}

pub async fn check_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let payment = state
        .service_context
        .payment_service
        .check_status(&current.user, id)
        .await?;

    Ok(Json(payment))
}

/// STK push result from Safaricom. Always answered with 200 and an acknowledgement body.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let report = match mpesa::parse_callback(&body) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("Rejected M-Pesa callback: {}", e);
            return Json(CallbackAck::rejected("Invalid callback"));
        }
    };

    Json(state.service_context.payment_service.handle_callback(report).await)
}
