use once_cell::sync::Lazy;
use regex::Regex;

use super::WorkflowError;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{10}$").expect("static phone pattern"));

/// Column width of the free-text registration fields.
pub const MAX_FIELD_LEN: usize = 255;

/// Raw submission as it arrives from the multipart form. Missing parts stay
/// `None` and are reported by [`RegistrationForm::validate`].
#[derive(Debug, Default, Clone)]
pub struct RegistrationForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub roll_college: Option<String>,
    pub utr: Option<String>,
    pub screenshot: Option<Screenshot>,
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// A submission that passed the field rules. Text is trimmed and the email
/// lowercased, so store-level uniqueness compares normalized values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub roll_college: String,
    pub utr: String,
}

impl RegistrationForm {
    /// Applies the field rules in order and stops at the first violation:
    /// required fields, email shape, phone shape.
    pub fn validate(self) -> Result<(ValidSubmission, Option<Screenshot>), WorkflowError> {
        let name = required("name", self.name)?;
        let email = required("email", self.email)?.to_lowercase();
        let phone = required("phone", self.phone)?;
        let roll_college = required("roll_college", self.roll_college)?;
        let utr = required("utr", self.utr)?;

        if !EMAIL_RE.is_match(&email) {
            return Err(WorkflowError::validation("email", "Invalid email address"));
        }
        if !PHONE_RE.is_match(&phone) {
            return Err(WorkflowError::validation(
                "phone",
                "Invalid phone number: expected exactly 10 digits",
            ));
        }

        let screenshot = self.screenshot.filter(|shot| !shot.bytes.is_empty());

        Ok((
            ValidSubmission {
                name,
                email,
                phone,
                roll_college,
                utr,
            },
            screenshot,
        ))
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, WorkflowError> {
    let value = value.as_deref().map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(WorkflowError::validation(field, format!("{field} is required")));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(WorkflowError::validation(
            field,
            format!("{field} must be at most {MAX_FIELD_LEN} characters"),
        ));
    }
    Ok(value.to_string())
}
