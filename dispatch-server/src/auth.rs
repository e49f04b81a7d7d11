//! Caller context attached by the upstream authentication layer.
//!
//! Bearer tokens are verified before requests reach this service; the
//! gateway forwards the resolved account as two headers, which are trusted.

use crate::response::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use dispatch_core::{Actor, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone, Debug)]
pub struct Caller(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthenticated("missing caller identity"))?;
        let role = header(parts, USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::unauthenticated("missing caller role"))?
            .parse::<Role>()
            .map_err(|_| ApiError::unauthenticated("unrecognised caller role"))?;
        Ok(Caller(Actor::new(id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
