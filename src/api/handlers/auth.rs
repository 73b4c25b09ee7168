use axum::{extract::State, http::HeaderMap, Json};
use chrono::{Duration, Utc};
use serde::Serialize;

use crate::{
    api::state::AppState,
    auth,
    error::{AppError, Result},
};

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Revoke the presented bearer token for every instance sharing the database.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>> {
    let token = auth::bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let expires_at = Utc::now() + Duration::hours(state.settings.auth.token_ttl_hours);

    state
        .service_context
        .denylist
        .revoke(token, expires_at)
        .await?;

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}
