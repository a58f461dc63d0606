//! Request extractors for the signed-in session.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use time::OffsetDateTime;

use crate::application::identity::IdentityService;
use crate::domain::identity::Session;
use crate::infra::session::SessionCodec;

use super::api::error::ApiError;

#[derive(Clone)]
pub struct SessionState {
    pub codec: SessionCodec,
    pub identity: Arc<IdentityService>,
}

impl SessionState {
    pub fn new(codec: SessionCodec, identity: Arc<IdentityService>) -> Self {
        Self { codec, identity }
    }

    /// Decode the session cookie and hydrate it from the author store.
    pub async fn current(&self, headers: &HeaderMap) -> Option<Session> {
        let jar = self.codec.jar(headers);
        let session = self.codec.load(&jar, OffsetDateTime::now_utc())?;
        Some(self.identity.hydrate(session).await)
    }
}

/// The hydrated session, or `None` for anonymous visitors.
pub struct CurrentSession(pub Option<Session>);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
    SessionState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionState::from_ref(state);
        Ok(Self(sessions.current(&parts.headers).await))
    }
}

/// A hydrated session; JSON handlers reject anonymous callers with 401.
pub struct RequireSession(pub Session);

impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
    SessionState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionState::from_ref(state);
        sessions
            .current(&parts.headers)
            .await
            .map(Self)
            .ok_or_else(ApiError::unauthorized)
    }
}
