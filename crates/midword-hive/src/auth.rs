use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};
use midword_core::types::UserId;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;

pub const USER_HEADER: &str = "x-midword-user";
pub const SECRET_HEADER: &str = "x-midword-secret";

/// Caller id set by the authenticating proxy, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub Option<UserId>);

impl Identity {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(Identity(id))
    }
}

/// Guards admin routes. Open when no secret is configured.
pub async fn require_secret(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let secret = match &state.admin_secret {
        Some(s) => s,
        None => return Ok(next.run(req).await),
    };

    let provided = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|h| h.to_str().ok());

    match provided {
        Some(val) if val == secret => Ok(next.run(req).await),
        Some(_) => {
            warn!("⛔ Auth Failed: Invalid Secret provided from {:?}", req.uri());
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("⛔ Auth Failed: Missing Header from {:?}", req.uri());
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
