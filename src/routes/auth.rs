use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    auth::SESSION_COOKIE_NAME,
    config::AppConfig,
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(HeaderMap, Json<Value>)> {
    let Json(payload) =
        payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let issued = state.sessions.login(&payload.email, &payload.password)?;
    info!(admin_id = %issued.admin_id, "admin logged in");

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_session_cookie(&state.config, &issued.token, issued.expires_at)?,
    );

    Ok((headers, Json(json!({ "success": true }))))
}

/// Always clears the cookie, whether or not a session was found.
pub async fn logout(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<Value>)> {
    let token = jar
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(SESSION_COOKIE_NAME));
    state.sessions.logout(token)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_session_cookie(&state.config)?);
    Ok((headers, Json(json!({ "success": true }))))
}

/// Mounted behind the session guard, so reaching it means the cookie is live.
pub async fn session_status() -> Json<Value> {
    Json(json!({ "authenticated": true }))
}

fn build_session_cookie(
    config: &AppConfig,
    token: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = chrono::Duration::hours(config.session_ttl_hours).num_seconds();

    let mut parts = vec![format!("{SESSION_COOKIE_NAME}={token}")];
    parts.push(format!("Max-Age={max_age}"));
    parts.push(format!(
        "Expires={}",
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    ));
    push_common_attributes(&mut parts, config);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn build_clear_session_cookie(config: &AppConfig) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{SESSION_COOKIE_NAME}=")];
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    push_common_attributes(&mut parts, config);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn push_common_attributes(parts: &mut Vec<String>, config: &AppConfig) {
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Lax".into());
    if config.session_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &config.session_cookie_domain {
        parts.push(format!("Domain={domain}"));
    }
}
