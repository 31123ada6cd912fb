use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::extractors::CurrentUser;
use crate::{error::AppError, state::AppState};

/// Pulls the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Rejects the request with 401 unless it carries a valid token for a user
/// that still exists; otherwise stores that user as [`CurrentUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(req.headers()) else {
        warn!("missing or malformed Authorization header");
        return Err(AppError::Unauthorized);
    };

    let claims = state.keys.verify(token).map_err(|e| {
        warn!(reason = %e, "token rejected");
        AppError::Unauthorized
    })?;

    let user = match state.users.find_by_id(claims.sub).await? {
        Some(u) => u,
        None => {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            return Err(AppError::Unauthorized);
        }
    };

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
