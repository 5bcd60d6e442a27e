use chrono::Utc;
use diesel::pg::PgConnection;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    store, AdminAction, RegistrationFilter, RegistrationForm, RegistrationStats, Screenshot,
    WorkflowError,
};
use crate::models::{NewRegistration, Registration, RegistrationStatus};
use crate::notifier::{self, Attachment};
use crate::state::AppState;
use crate::storage::{self, inline_content_disposition, ObjectStorage};
use crate::ticket::{self, TICKET_CONTENT_TYPE};

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub ticket_url: String,
    pub email_sent: bool,
}

/// Validates `form`, creates a pending registration and then stores the
/// optional screenshot under its id. The "submission received" email is sent
/// in the background.
pub async fn submit(state: &AppState, form: RegistrationForm) -> Result<Uuid, WorkflowError> {
    let (submission, screenshot) = form.validate()?;

    {
        let mut conn = state.db()?;
        if store::utr_taken(&mut conn, &submission.utr)? {
            return Err(WorkflowError::DuplicateTransactionReference);
        }
        if store::email_taken(&mut conn, &submission.email)? {
            return Err(WorkflowError::DuplicateEmail);
        }
    }

    let new_registration = NewRegistration {
        id: Uuid::new_v4(),
        name: submission.name,
        email: submission.email,
        phone: submission.phone,
        roll_college: submission.roll_college,
        utr: submission.utr,
        screenshot_url: None,
        status: RegistrationStatus::Pending.as_str().to_string(),
        checked_in: false,
        created_at: Utc::now().naive_utc(),
    };

    let mut registration = {
        let mut conn = state.db()?;
        store::insert(&mut conn, &new_registration)?
    };

    if let Some(screenshot) = screenshot {
        if let Some(url) =
            store_screenshot(state.storage.as_ref(), registration.id, screenshot).await
        {
            match link_screenshot(state, registration.id, &url) {
                Ok(Some(row)) => registration = row,
                Ok(None) => warn!(registration_id = %registration.id, "registration missing when linking screenshot"),
                Err(err) => warn!(registration_id = %registration.id, error = %err, "failed to record screenshot url"),
            }
        }
    }

    info!(
        registration_id = %registration.id,
        has_screenshot = registration.screenshot_url.is_some(),
        "registration submitted"
    );

    let email = notifier::pending_email(&registration, &state.config.event);
    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        notifier::deliver(notifier.as_ref(), email, "registration_received").await;
    });

    Ok(registration.id)
}

/// Upload failures are logged and the registration proceeds without a
/// screenshot reference.
async fn store_screenshot(
    storage: &dyn ObjectStorage,
    id: Uuid,
    screenshot: Screenshot,
) -> Option<String> {
    let extension = screenshot_extension(&screenshot);
    let key = storage::screenshot_key(id, &extension);
    let content_type = screenshot.content_type.clone().or_else(|| {
        mime_guess::from_ext(&extension)
            .first()
            .map(|mime| mime.to_string())
    });

    match storage
        .put_object(&key, screenshot.bytes, content_type, None)
        .await
    {
        Ok(()) => Some(storage.public_url(&key)),
        Err(err) => {
            warn!(registration_id = %id, error = %format!("{err:#}"), "screenshot upload failed");
            None
        }
    }
}

fn link_screenshot(
    state: &AppState,
    id: Uuid,
    url: &str,
) -> Result<Option<Registration>, WorkflowError> {
    let mut conn = state.db()?;
    Ok(store::set_screenshot_url(&mut conn, id, url)?)
}

fn screenshot_extension(screenshot: &Screenshot) -> String {
    let from_name = screenshot
        .file_name
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });

    from_name
        .or_else(|| {
            screenshot
                .content_type
                .as_deref()
                .and_then(mime_guess::get_mime_extensions_str)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string())
}

/// Issues the ticket for a pending registration and emails it. The status
/// only changes after the ticket is stored; email failure is reported in the
/// outcome but never undoes the transition.
pub async fn verify(state: &AppState, id: Uuid) -> Result<VerifyOutcome, WorkflowError> {
    let registration = {
        let mut conn = state.db()?;
        store::find(&mut conn, id)?.ok_or(WorkflowError::NotFound)?
    };
    AdminAction::Verify.check(&registration)?;

    let ticket = ticket::render_ticket(&registration, &state.config.event)
        .map_err(WorkflowError::TicketGenerationFailed)?;

    let key = storage::ticket_key(id);
    state
        .storage
        .put_object(
            &key,
            ticket.bytes.clone(),
            Some(TICKET_CONTENT_TYPE.to_string()),
            inline_content_disposition(&ticket.filename),
        )
        .await
        .map_err(WorkflowError::TicketGenerationFailed)?;
    let ticket_url = state.storage.public_url(&key);

    let verified = {
        let mut conn = state.db()?;
        match store::mark_verified(&mut conn, id, &ticket_url, Utc::now().naive_utc())? {
            Some(row) => row,
            None => return Err(lost_transition(&mut conn, id, AdminAction::Verify)),
        }
    };
    info!(registration_id = %id, "registration verified");

    let attachment = Attachment {
        filename: ticket.filename,
        content: ticket.bytes,
        content_type: TICKET_CONTENT_TYPE.to_string(),
    };
    let email = notifier::confirmation_email(&verified, &state.config.event, attachment);
    let email_sent =
        notifier::deliver(state.notifier.as_ref(), email, "registration_confirmed").await;

    Ok(VerifyOutcome {
        ticket_url,
        email_sent,
    })
}

pub fn reject(state: &AppState, id: Uuid) -> Result<Registration, WorkflowError> {
    let mut conn = state.db()?;
    transition(&mut conn, id, AdminAction::Reject, store::mark_rejected)
}

pub fn check_in(state: &AppState, id: Uuid) -> Result<Registration, WorkflowError> {
    let mut conn = state.db()?;
    transition(&mut conn, id, AdminAction::CheckIn, store::mark_checked_in)
}

pub fn list(
    state: &AppState,
    filter: &RegistrationFilter,
) -> Result<Vec<Registration>, WorkflowError> {
    let mut conn = state.db()?;
    Ok(store::list(&mut conn, filter)?)
}

pub fn stats(state: &AppState) -> Result<RegistrationStats, WorkflowError> {
    let mut conn = state.db()?;
    Ok(store::stats(&mut conn)?)
}

fn transition(
    conn: &mut PgConnection,
    id: Uuid,
    action: AdminAction,
    apply: fn(&mut PgConnection, Uuid) -> diesel::QueryResult<Option<Registration>>,
) -> Result<Registration, WorkflowError> {
    let current = store::find(conn, id)?.ok_or(WorkflowError::NotFound)?;
    action.check(&current)?;

    match apply(conn, id)? {
        Some(row) => {
            info!(registration_id = %id, action = action.as_str(), "registration updated");
            Ok(row)
        }
        None => Err(lost_transition(conn, id, action)),
    }
}

/// Explains a conditional update that matched no row by re-reading it.
fn lost_transition(conn: &mut PgConnection, id: Uuid, action: AdminAction) -> WorkflowError {
    let current = match store::find(conn, id) {
        Ok(Some(row)) => row,
        Ok(None) => return WorkflowError::NotFound,
        Err(err) => return err.into(),
    };
    warn!(registration_id = %id, action = action.as_str(), "concurrent admin action won the transition");
    match action.check(&current) {
        Err(err) => err,
        Ok(()) => WorkflowError::Storage(anyhow::anyhow!(
            "conditional {} update matched no row for {id}",
            action.as_str()
        )),
    }
}
