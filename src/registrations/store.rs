use anyhow::anyhow;
use chrono::NaiveDateTime;
use diesel::{
    dsl::{count_star, exists},
    pg::PgConnection,
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use serde::Serialize;
use uuid::Uuid;

use super::WorkflowError;
use crate::models::{NewRegistration, Registration, RegistrationStatus};
use crate::schema::registrations;

const UTR_CONSTRAINT: &str = "registrations_utr_key";
const EMAIL_CONSTRAINT: &str = "registrations_email_key";

/// Read-side filter for the admin listing. `None` fields do not filter.
#[derive(Debug, Default, Clone)]
pub struct RegistrationFilter {
    pub status: Option<RegistrationStatus>,
    pub search: Option<String>,
}

impl RegistrationFilter {
    fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }
        Some(format!("%{}%", escape_like(term)))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationStats {
    pub total: i64,
    pub pending: i64,
    pub verified: i64,
    pub rejected: i64,
    pub checked_in: i64,
}

pub fn find(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Registration>> {
    registrations::table
        .find(id)
        .select(Registration::as_select())
        .first(conn)
        .optional()
}

pub fn utr_taken(conn: &mut PgConnection, utr: &str) -> QueryResult<bool> {
    diesel::select(exists(registrations::table.filter(registrations::utr.eq(utr)))).get_result(conn)
}

pub fn email_taken(conn: &mut PgConnection, email: &str) -> QueryResult<bool> {
    diesel::select(exists(
        registrations::table.filter(registrations::email.eq(email)),
    ))
    .get_result(conn)
}

/// Inserts a new row. The unique constraints are the authoritative duplicate
/// guard; a violation maps to the matching duplicate kind.
pub fn insert(
    conn: &mut PgConnection,
    new_registration: &NewRegistration,
) -> Result<Registration, WorkflowError> {
    match diesel::insert_into(registrations::table)
        .values(new_registration)
        .returning(Registration::as_returning())
        .get_result(conn)
    {
        Ok(row) => Ok(row),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
            match info.constraint_name() {
                Some(UTR_CONSTRAINT) => Err(WorkflowError::DuplicateTransactionReference),
                Some(EMAIL_CONSTRAINT) => Err(WorkflowError::DuplicateEmail),
                other => Err(WorkflowError::Storage(anyhow!(
                    "unexpected unique violation on {:?}: {}",
                    other,
                    info.message()
                ))),
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Records where the payment screenshot was stored.
pub fn set_screenshot_url(
    conn: &mut PgConnection,
    id: Uuid,
    screenshot_url: &str,
) -> QueryResult<Option<Registration>> {
    diesel::update(registrations::table.find(id))
        .set(registrations::screenshot_url.eq(Some(screenshot_url)))
        .returning(Registration::as_returning())
        .get_result(conn)
        .optional()
}

/// `pending -> verified`. Returns `None` when the row is missing or no longer
/// pending.
pub fn mark_verified(
    conn: &mut PgConnection,
    id: Uuid,
    ticket_url: &str,
    verified_at: NaiveDateTime,
) -> QueryResult<Option<Registration>> {
    diesel::update(
        registrations::table
            .filter(registrations::id.eq(id))
            .filter(registrations::status.eq(RegistrationStatus::Pending.as_str())),
    )
    .set((
        registrations::status.eq(RegistrationStatus::Verified.as_str()),
        registrations::verified_at.eq(Some(verified_at)),
        registrations::ticket_url.eq(Some(ticket_url)),
    ))
    .returning(Registration::as_returning())
    .get_result(conn)
    .optional()
}

/// `pending -> rejected`.
pub fn mark_rejected(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Registration>> {
    diesel::update(
        registrations::table
            .filter(registrations::id.eq(id))
            .filter(registrations::status.eq(RegistrationStatus::Pending.as_str())),
    )
    .set(registrations::status.eq(RegistrationStatus::Rejected.as_str()))
    .returning(Registration::as_returning())
    .get_result(conn)
    .optional()
}

/// `verified, checked_in = false -> checked_in = true`.
pub fn mark_checked_in(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Registration>> {
    diesel::update(
        registrations::table
            .filter(registrations::id.eq(id))
            .filter(registrations::status.eq(RegistrationStatus::Verified.as_str()))
            .filter(registrations::checked_in.eq(false)),
    )
    .set(registrations::checked_in.eq(true))
    .returning(Registration::as_returning())
    .get_result(conn)
    .optional()
}

/// Newest first, ties broken by id for a stable order.
pub fn list(
    conn: &mut PgConnection,
    filter: &RegistrationFilter,
) -> QueryResult<Vec<Registration>> {
    let mut query = registrations::table
        .select(Registration::as_select())
        .order((registrations::created_at.desc(), registrations::id.asc()))
        .into_boxed();

    if let Some(status) = filter.status {
        query = query.filter(registrations::status.eq(status.as_str()));
    }

    if let Some(pattern) = filter.search_pattern() {
        query = query.filter(
            registrations::name
                .ilike(pattern.clone())
                .or(registrations::email.ilike(pattern.clone()))
                .or(registrations::utr.ilike(pattern)),
        );
    }

    query.load(conn)
}

pub fn stats(conn: &mut PgConnection) -> QueryResult<RegistrationStats> {
    let by_status: Vec<(String, i64)> = registrations::table
        .group_by(registrations::status)
        .select((registrations::status, count_star()))
        .load(conn)?;

    let checked_in: i64 = registrations::table
        .filter(registrations::checked_in.eq(true))
        .select(count_star())
        .first(conn)?;

    let mut stats = RegistrationStats {
        checked_in,
        ..RegistrationStats::default()
    };
    for (status, count) in by_status {
        stats.total += count;
        match status.parse::<RegistrationStatus>() {
            Ok(RegistrationStatus::Pending) => stats.pending += count,
            Ok(RegistrationStatus::Verified) => stats.verified += count,
            Ok(RegistrationStatus::Rejected) => stats.rejected += count,
            Err(_) => {}
        }
    }
    Ok(stats)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
