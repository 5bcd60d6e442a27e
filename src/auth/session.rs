use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use once_cell::sync::Lazy;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use super::{password, AuthError};
use crate::{
    db::PgPool,
    models::{AdminUser, NewAdminSession},
    schema::{admin_sessions, admin_users},
    state::PgPooledConnection,
};

/// Checked on logins for unknown emails so they cost the same argon2 work as
/// a wrong password.
static UNKNOWN_ADMIN_HASH: Lazy<Option<String>> =
    Lazy::new(|| password::hash_password("unknown-admin-placeholder").ok());

/// A freshly minted credential. `token` is only ever held by the client;
/// the store keeps its SHA-256 digest.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub admin_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Store-backed admin sessions. No session state lives in the process.
#[derive(Clone)]
pub struct SessionAuthenticator {
    pool: PgPool,
    ttl: ChronoDuration,
}

impl SessionAuthenticator {
    pub fn new(pool: PgPool, ttl_hours: i64) -> Self {
        Self {
            pool,
            ttl: ChronoDuration::hours(ttl_hours),
        }
    }

    fn conn(&self) -> Result<PgPooledConnection, AuthError> {
        self.pool
            .get()
            .map_err(|err| AuthError::Storage(anyhow::anyhow!("database pool error: {err}")))
    }

    /// Unknown email and wrong password both end in `InvalidCredentials`.
    pub fn login(&self, email: &str, password_input: &str) -> Result<IssuedSession, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password_input.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let mut conn = self.conn()?;
        let admin = admin_users::table
            .filter(admin_users::email.eq(&email))
            .select(AdminUser::as_select())
            .first(&mut conn)
            .optional()?;

        let Some(admin) = admin else {
            equalize_unknown_admin(password_input);
            info!("admin login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        let valid = match password::verify_password(password_input, &admin.password_hash) {
            Ok(valid) => valid,
            Err(err) => {
                error!(admin_id = %admin.id, error = %err, "stored admin password hash is malformed");
                false
            }
        };
        if !valid {
            info!(admin_id = %admin.id, "admin login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let token = generate_session_token();
        let expires_at = Utc::now() + self.ttl;
        let new_session = NewAdminSession {
            id: Uuid::new_v4(),
            admin_id: admin.id,
            token_hash: hash_session_token(&token),
            expires_at: expires_at.naive_utc(),
        };

        diesel::insert_into(admin_sessions::table)
            .values(&new_session)
            .execute(&mut conn)?;

        info!(admin_id = %admin.id, session_id = %new_session.id, "admin session issued");

        Ok(IssuedSession {
            token,
            admin_id: admin.id,
            expires_at,
        })
    }

    /// Returns the owning admin id iff `token` names an unexpired session.
    /// Store failures are logged and treated as unauthorized.
    pub fn validate(&self, token: Option<&str>) -> Option<Uuid> {
        let token = token.map(str::trim).filter(|value| !value.is_empty())?;
        let mut conn = match self.conn() {
            Ok(conn) => conn,
            Err(err) => {
                error!(error = %err, "session validation could not reach the store");
                return None;
            }
        };

        let now = Utc::now().naive_utc();
        match admin_sessions::table
            .filter(admin_sessions::token_hash.eq(hash_session_token(token)))
            .filter(admin_sessions::expires_at.gt(now))
            .select(admin_sessions::admin_id)
            .first::<Uuid>(&mut conn)
            .optional()
        {
            Ok(found) => found,
            Err(err) => {
                error!(error = %err, "session lookup failed");
                None
            }
        }
    }

    /// Deletes the session for `token` if there is one.
    pub fn logout(&self, token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = token.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(());
        };

        let mut conn = self.conn()?;
        let removed = diesel::delete(
            admin_sessions::table.filter(admin_sessions::token_hash.eq(hash_session_token(token))),
        )
        .execute(&mut conn)?;

        if removed > 0 {
            info!("admin session revoked");
        }
        Ok(())
    }

    /// Removes sessions whose expiry has passed. Validation never depends on
    /// this having run.
    pub fn purge_expired(&self) -> Result<usize, AuthError> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let removed =
            diesel::delete(admin_sessions::table.filter(admin_sessions::expires_at.le(now)))
                .execute(&mut conn)?;
        if removed > 0 {
            info!(removed, "purged expired admin sessions");
        }
        Ok(removed)
    }
}

fn equalize_unknown_admin(password_input: &str) -> bool {
    UNKNOWN_ADMIN_HASH
        .as_deref()
        .map(|hash| password::verify_password(password_input, hash).unwrap_or(false))
        .unwrap_or(false)
}

pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
