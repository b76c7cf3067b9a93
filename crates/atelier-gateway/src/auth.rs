use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use atelier_common::Error;
use atelier_db::User;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the authenticated caller from the `Authorization: Bearer`
/// header. The token subject is re-resolved against the users table on
/// every request rather than trusted from the claims alone.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("authorization header is not a bearer token".into()))?;

    let claims = state.signer.verify(token)?;
    let user = state
        .users
        .get_user_by_id(&claims.sub)
        .await?
        .ok_or_else(|| Error::Unauthorized("token subject no longer exists".into()))?;

    Ok(user)
}
