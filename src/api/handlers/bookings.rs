use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{
        Booking, CancelBookingRequest, CreateBookingRequest, CreateReviewRequest,
        InitiatePaymentRequest, InitiatedPayment, Meeting, Review,
    },
    error::Result,
    service::BookingDetails,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    bookings: Vec<Booking>,
    total: usize,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>)> {
    let booking = state
        .service_context
        .booking_service
        .create(&current.user, request)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>> {
    let bookings = state
        .service_context
        .booking_service
        .list_for(&current.user, params.limit, params.offset)
        .await?;

    let total = bookings.len();
    Ok(Json(ListResponse { bookings, total }))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingDetails>> {
    let details = state
        .service_context
        .booking_service
        .get_for(&current.user, id)
        .await?;

    Ok(Json(details))
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>> {
    let booking = state
        .service_context
        .booking_service
        .confirm(&current.user, id)
        .await?;

    Ok(Json(booking))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBookingRequest>>,
) -> Result<Json<Booking>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let booking = state
        .service_context
        .booking_service
        .cancel(&current.user, id, request)
        .await?;

    Ok(Json(booking))
}

pub async fn complete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>> {
    let booking = state
        .service_context
        .booking_service
        .complete(&current.user, id)
        .await?;

    Ok(Json(booking))
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatedPayment>)> {
    let initiated = state
        .service_context
        .payment_service
        .initiate(&current.user, id, request)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(initiated)))
}

pub async fn review(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = state
        .service_context
        .booking_service
        .review(&current.user, id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn create_meeting(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Meeting>)> {
    let meeting = state
        .service_context
        .booking_service
        .create_meeting(&current.user, id)
        .await?;

    Ok((StatusCode::CREATED, Json(meeting)))
}
