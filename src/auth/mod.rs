pub mod password;
pub mod session;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::{headers::Cookie, TypedHeader};
use thiserror::Error;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE_NAME: &str = "admin_session";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email and password are required")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("session store failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<diesel::result::Error> for AuthError {
    fn from(value: diesel::result::Error) -> Self {
        AuthError::Storage(value.into())
    }
}

/// Extractor guarding admin routes. Resolves only when the `admin_session`
/// cookie names a live session; otherwise the request is rejected with 401
/// before the handler runs. The resolved session is kept in the request
/// extensions, so the route guard and the handler share one store lookup.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub admin_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<AdminSession>() {
            return Ok(session.clone());
        }

        let token = session_token(parts, state).await;
        let session = state
            .sessions
            .validate(token.as_deref())
            .map(|admin_id| AdminSession { admin_id })
            .ok_or_else(|| AppError::from(AuthError::Unauthorized))?;
        parts.extensions.insert(session.clone());
        Ok(session)
    }
}

pub async fn session_token(parts: &mut Parts, state: &AppState) -> Option<String> {
    let TypedHeader(cookies) = TypedHeader::<Cookie>::from_request_parts(parts, state)
        .await
        .ok()?;
    cookies.get(SESSION_COOKIE_NAME).map(str::to_owned)
}
