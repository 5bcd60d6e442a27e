use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::registrations::{self, RegistrationForm, Screenshot, WorkflowError};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub registration_id: Uuid,
    pub message: &'static str,
}

pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let mut form = RegistrationForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("screenshot") => {
                let file_name = field.file_name().map(|n| n.to_string());
                let content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read screenshot bytes");
                    AppError::bad_request(format!("failed to read screenshot: {err}"))
                })?;
                form.screenshot = Some(Screenshot {
                    bytes: data.to_vec(),
                    file_name,
                    content_type,
                });
            }
            Some(key @ ("name" | "email" | "phone" | "roll_college" | "utr")) => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid {key} field: {err}"))
                })?;
                let slot = match key {
                    "name" => &mut form.name,
                    "email" => &mut form.email,
                    "phone" => &mut form.phone,
                    "roll_college" => &mut form.roll_college,
                    _ => &mut form.utr,
                };
                *slot = Some(value);
            }
            other => {
                let other = other.unwrap_or("<unnamed>").to_string();
                warn!(field = %other, "registration rejected: unexpected form field");
                return Err(WorkflowError::validation(
                    "form",
                    format!("unexpected form field '{other}'"),
                )
                .into());
            }
        }
    }

    let registration_id = registrations::submit(&state, form).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            registration_id,
            message: "Registration submitted successfully",
        }),
    ))
}
