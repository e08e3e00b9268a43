use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::{error, warn};

use crate::services::user_info::UserInfoError;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

/// Resolves the caller's display name and attaches it to the request.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    // Authorization header first, then the cookie
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .or_else(|| jar.get("token").map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized("Missing access token".to_string()))?;

    let user_info = state.user_lookup.get_user_info(&token).await.map_err(|e| match e {
        UserInfoError::Rejected => {
            warn!("Access token rejected by user info lookup.");
            AppError::Unauthorized("Invalid access token".to_string())
        }
        other => {
            error!(error = %other, "User info lookup failed.");
            AppError::InternalServerError("Unable to resolve the current user".to_string())
        }
    })?;

    req.extensions_mut().insert(AuthenticatedUser {
        display_name: user_info.display_name,
    });
    Ok(next.run(req).await)
}
