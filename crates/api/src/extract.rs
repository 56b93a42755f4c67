//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use cart::OwnerId;

use crate::error::ApiError;

/// Header carrying the identity of the calling principal.
pub const OWNER_HEADER: &str = "x-owner-id";

/// The principal issuing the request, read from the `x-owner-id` header.
///
/// Session handling lives in front of this service; it is trusted to set the
/// header.
#[derive(Debug, Clone, Copy)]
pub struct Owner(pub OwnerId);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("Missing {OWNER_HEADER} header")))?;

        value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<OwnerId>().ok())
            .map(Owner)
            .ok_or_else(|| ApiError::Unauthenticated(format!("Invalid {OWNER_HEADER} header")))
    }
}
