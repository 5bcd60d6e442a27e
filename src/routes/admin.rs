use axum::{
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderValue,
    },
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::AdminSession;
use crate::error::{AppError, AppResult};
use crate::models::{Registration, RegistrationStatus};
use crate::registrations::{
    self,
    export::{export_filename, registrations_csv, CSV_CONTENT_TYPE},
    RegistrationFilter, RegistrationStats, WorkflowError,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

impl RegistrationListQuery {
    fn into_filter(self) -> AppResult<RegistrationFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(value) => Some(
                value
                    .parse::<RegistrationStatus>()
                    .map_err(|err| AppError::bad_request(err.to_string()))?,
            ),
        };
        Ok(RegistrationFilter {
            status,
            search: self.search,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub roll_college: String,
    pub utr: String,
    pub screenshot_url: Option<String>,
    pub status: String,
    pub checked_in: bool,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub ticket_url: Option<String>,
}

impl From<Registration> for RegistrationResponse {
    fn from(row: Registration) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            roll_college: row.roll_college,
            utr: row.utr,
            screenshot_url: row.screenshot_url,
            status: row.status,
            checked_in: row.checked_in,
            created_at: row.created_at.and_utc(),
            verified_at: row.verified_at.map(|at| at.and_utc()),
            ticket_url: row.ticket_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationListResponse {
    pub registrations: Vec<RegistrationResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub ticket_url: String,
    pub email_sent: bool,
}

/// An id that cannot name a registration is reported as not found.
fn registration_id(raw: &str) -> Result<Uuid, WorkflowError> {
    Uuid::parse_str(raw.trim()).map_err(|_| WorkflowError::NotFound)
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Query(query): Query<RegistrationListQuery>,
) -> AppResult<Json<RegistrationListResponse>> {
    let filter = query.into_filter()?;
    let rows = registrations::list(&state, &filter)?;
    Ok(Json(RegistrationListResponse {
        registrations: rows.into_iter().map(RegistrationResponse::from).collect(),
    }))
}

pub async fn export_registrations(
    State(state): State<AppState>,
    Query(query): Query<RegistrationListQuery>,
) -> AppResult<(HeaderMap, String)> {
    let filter = query.into_filter()?;
    let rows = registrations::list(&state, &filter)?;
    let body = registrations_csv(&rows);

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CSV_CONTENT_TYPE));
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_filename(&state.config.event.name)
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(AppError::internal)?,
    );

    Ok((headers, body))
}

pub async fn registration_stats(
    State(state): State<AppState>,
) -> AppResult<Json<RegistrationStats>> {
    Ok(Json(registrations::stats(&state)?))
}

pub async fn verify_registration(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(raw_id): Path<String>,
) -> AppResult<Json<VerifyResponse>> {
    let id = registration_id(&raw_id)?;
    let outcome = registrations::verify(&state, id).await?;
    info!(
        admin_id = %admin.admin_id,
        registration_id = %id,
        email_sent = outcome.email_sent,
        "admin verified registration"
    );
    Ok(Json(VerifyResponse {
        success: true,
        ticket_url: outcome.ticket_url,
        email_sent: outcome.email_sent,
    }))
}

pub async fn reject_registration(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(raw_id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = registration_id(&raw_id)?;
    registrations::reject(&state, id)?;
    info!(admin_id = %admin.admin_id, registration_id = %id, "admin rejected registration");
    Ok(Json(json!({ "success": true })))
}

pub async fn check_in_registration(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(raw_id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = registration_id(&raw_id)?;
    registrations::check_in(&state, id)?;
    info!(admin_id = %admin.admin_id, registration_id = %id, "admin checked in registration");
    Ok(Json(json!({ "success": true })))
}
