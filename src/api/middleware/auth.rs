use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::{
    api::state::AppState,
    auth,
    domain::{User, UserRole},
    error::AppError,
};

#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
}

async fn resolve_actor(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    match auth::bearer_token(headers) {
        Some(token) => {
            if state.service_context.denylist.is_revoked(token).await? {
                return Err(AppError::Unauthorized);
            }
        }
        None if state.settings.auth.require_bearer => return Err(AppError::Unauthorized),
        None => {}
    }

    let user_id = auth::actor_id(headers)?;
    let user = state
        .service_context
        .user_repo
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_active {
        return Err(AppError::Unauthorized);
    }

    Ok(user)
}

pub async fn require_actor(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_actor(&state, request.headers()).await?;

    request.extensions_mut().insert(CurrentUser { user });

    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_actor(&state, request.headers()).await?;

    if user.role != UserRole::Admin {
        return Err(AppError::Authorization(
            "Administrator access required".to_string(),
        ));
    }

    request.extensions_mut().insert(CurrentUser { user });

    Ok(next.run(request).await)
}
