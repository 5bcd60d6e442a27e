//! Registration workflow: public submission and the admin state transitions
//! `pending -> verified | rejected` and `verified -> checked in`.

pub mod export;
pub mod store;
pub mod validation;
mod workflow;

use thiserror::Error;

use crate::models::{Registration, RegistrationStatus};

pub use store::{RegistrationFilter, RegistrationStats};
pub use validation::{RegistrationForm, Screenshot, ValidSubmission};
pub use workflow::{check_in, list, reject, stats, submit, verify, VerifyOutcome};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("This UTR has already been used for another registration")]
    DuplicateTransactionReference,
    #[error("This email has already been registered")]
    DuplicateEmail,
    #[error("Registration not found")]
    NotFound,
    #[error("Registration is {0}")]
    InvalidState(&'static str),
    #[error("Already checked in")]
    AlreadyCheckedIn,
    #[error("failed to generate ticket")]
    TicketGenerationFailed(#[source] anyhow::Error),
    #[error("registration store failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl WorkflowError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(value: anyhow::Error) -> Self {
        WorkflowError::Storage(value)
    }
}

impl From<diesel::result::Error> for WorkflowError {
    fn from(value: diesel::result::Error) -> Self {
        WorkflowError::Storage(value.into())
    }
}

/// Admin transitions and the precondition each one places on the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Verify,
    Reject,
    CheckIn,
}

impl AdminAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AdminAction::Verify => "verify",
            AdminAction::Reject => "reject",
            AdminAction::CheckIn => "check_in",
        }
    }

    pub fn check(self, registration: &Registration) -> Result<(), WorkflowError> {
        let status = registration
            .status()
            .map_err(|err| WorkflowError::Storage(err.into()))?;

        match self {
            AdminAction::Verify | AdminAction::Reject => {
                if status != RegistrationStatus::Pending {
                    return Err(WorkflowError::InvalidState("not pending"));
                }
            }
            AdminAction::CheckIn => {
                if status != RegistrationStatus::Verified {
                    return Err(WorkflowError::InvalidState("not verified"));
                }
                if registration.checked_in {
                    return Err(WorkflowError::AlreadyCheckedIn);
                }
            }
        }
        Ok(())
    }
}
