use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};

use super::repo::User;
use crate::error::AppError;

/// The authenticated caller, placed in request extensions by
/// [`require_auth`](super::middleware::require_auth).
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Absent only when a route was wired without the middleware.
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
