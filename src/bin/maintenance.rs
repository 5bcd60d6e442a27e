use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use registration_backend::{
    auth::{password, session::SessionAuthenticator},
    config::AppConfig,
    db,
    models::NewAdminUser,
    run_migrations,
    schema::admin_users,
};

const USAGE: &str = "Usage:
  maintenance create-admin <email> <password>
  maintenance hash-password <password>
  maintenance purge-sessions";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create-admin", email, plain] => create_admin(email, plain)?,
        ["hash-password", plain] => println!("{}", password::hash_password(plain)?),
        ["purge-sessions"] => purge_sessions()?,
        [cmd, ..] => {
            eprintln!("Unknown command or arguments: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        [] => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<(AppConfig, db::PgPool)> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let config = AppConfig::with_defaults(database_url);
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "connecting to database"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    {
        let mut conn = pool.get().context("failed to get database connection")?;
        run_migrations(&mut conn)?;
    }
    Ok((config, pool))
}

fn create_admin(email: &str, password_input: &str) -> Result<()> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        bail!("a valid admin email is required");
    }
    if password_input.len() < 8 {
        bail!("admin password must be at least 8 characters");
    }

    let (_, pool) = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let new_admin = NewAdminUser {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash: password::hash_password(password_input)?,
    };

    match diesel::insert_into(admin_users::table)
        .values(&new_admin)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            bail!("an admin with email {email} already exists");
        }
        Err(err) => return Err(err).context("failed to insert admin user"),
    }

    println!("Created admin {email} ({})", new_admin.id);
    Ok(())
}

fn purge_sessions() -> Result<()> {
    let (config, pool) = connect()?;
    let sessions = SessionAuthenticator::new(pool, config.session_ttl_hours);
    let removed = sessions.purge_expired()?;
    println!("Removed {removed} expired sessions.");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
