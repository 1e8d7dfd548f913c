//! Buyer identity extractor.
//!
//! Authentication happens upstream. The gateway forwards the verified identity as
//! `x-user-id` and `x-membership-tier`; a request without a valid pair is rejected with
//! 401 before any handler runs.

use super::error::AppError;
use crate::services::Buyer;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use fairsale_core::{MembershipTier, UserId};

/// Header carrying the user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the membership tier.
pub const TIER_HEADER: &str = "x-membership-tier";

#[async_trait]
impl<S> FromRequestParts<S> for Buyer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing user identity"))?
            .parse::<UserId>()
            .map_err(|_| AppError::unauthorized("Invalid user identity"))?;

        let tier = match header(TIER_HEADER) {
            Some(raw) => raw
                .parse::<MembershipTier>()
                .map_err(|_| AppError::unauthorized("Invalid membership tier"))?,
            None => MembershipTier::Basic,
        };

        Ok(Self { user_id, tier })
    }
}
