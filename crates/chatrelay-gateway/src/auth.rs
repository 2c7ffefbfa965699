use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chatrelay_common::{Error, UserId};

use crate::error::ApiError;
use crate::state::SharedState;

pub const USER_HEADER: &str = "x-user-id";

/// The caller a request acts on behalf of.
///
/// Identity comes from the `x-user-id` header set by the fronting auth
/// proxy. When `gateway.api_key` is configured the request must also carry
/// `Authorization: Bearer <key>`.
#[derive(Debug, Clone)]
pub struct Identity(pub UserId);

impl FromRequestParts<SharedState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(expected) = state.config.gateway.api_key.as_deref() {
            let provided = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            if provided != Some(expected) {
                return Err(Error::Unauthorized("missing or invalid API key".into()).into());
            }
        }

        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Unauthorized(format!("missing {USER_HEADER} header")))?;

        Ok(Identity(UserId::from(user)))
    }
}
