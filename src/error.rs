use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::error;

use crate::auth::AuthError;
use crate::registrations::WorkflowError;

pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    /// Logs `error` and hides it behind a generic 500.
    pub fn internal<E: Display>(error: E) -> Self {
        error!(error = %error, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Validation { .. } => AppError::bad_request(value.to_string()),
            WorkflowError::DuplicateTransactionReference | WorkflowError::DuplicateEmail => {
                AppError::new(StatusCode::CONFLICT, value.to_string())
            }
            WorkflowError::NotFound => AppError::new(StatusCode::NOT_FOUND, value.to_string()),
            WorkflowError::InvalidState(_) | WorkflowError::AlreadyCheckedIn => {
                AppError::bad_request(value.to_string())
            }
            WorkflowError::TicketGenerationFailed(err) => {
                error!(error = ?err, "ticket generation failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to generate ticket",
                )
            }
            WorkflowError::Storage(err) => AppError::internal(format!("{err:#}")),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => {
                AppError::new(StatusCode::UNAUTHORIZED, value.to_string())
            }
            AuthError::MissingCredentials => AppError::bad_request(value.to_string()),
            AuthError::Unauthorized => AppError::unauthorized(),
            AuthError::Storage(err) => AppError::internal(format!("{err:#}")),
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(format!("{value:#}"))
    }
}
