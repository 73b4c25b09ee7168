use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::TutorSearch,
    error::Result,
    service::{Availability, RecommendedTutor, TutorPage, TutorProfile},
};

#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

pub async fn recommended(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<Vec<RecommendedTutor>>> {
    let tutors = state
        .service_context
        .recommendation_service
        .recommend_for_student(current.user.id, params.limit.clamp(1, 50))
        .await?;

    Ok(Json(tutors))
}

#[derive(Debug, Deserialize)]
pub struct SlotParams {
    date: NaiveDate,
    time: NaiveTime,
}

pub async fn search(
    State(state): State<AppState>,
    Query(filters): Query<TutorSearch>,
) -> Result<Json<TutorPage>> {
    let page = state.service_context.tutor_service.search(&filters).await?;
    Ok(Json(page))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TutorProfile>> {
    let profile = state.service_context.tutor_service.profile(id).await?;
    Ok(Json(profile))
}

pub async fn availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(slot): Query<SlotParams>,
) -> Result<Json<Availability>> {
    let availability = state
        .service_context
        .tutor_service
        .availability(id, slot.date, slot.time)
        .await?;

    Ok(Json(availability))
}
