use axum::{
    Extension, Json,
    extract::State,
    response::{IntoResponse, Response},
};
use icelog_api_types::TokenEnvelope;
use tracing::info;

use crate::application::auth::{AuthError, Principal};

use super::{HttpState, error::ApiError};

/// Reissue a token for the caller identified by the current one.
pub async fn refresh_token(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, ApiError> {
    let authority = state.auth.as_ref().ok_or(AuthError::Missing)?;
    let token = authority.issue(&principal)?;

    info!(
        target = "icelog::http::auth",
        user_id = %principal.user_id,
        "token refreshed"
    );

    Ok(Json(TokenEnvelope::success(token)).into_response())
}
