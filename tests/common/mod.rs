use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use registration_backend::auth::password::hash_password;
use registration_backend::config::AppConfig;
use registration_backend::db::{self, PgPool};
use registration_backend::models::{NewAdminUser, Registration};
use registration_backend::notifier::{Notifier, OutboundEmail};
use registration_backend::routes;
use registration_backend::schema::{admin_sessions, admin_users, registrations};
use registration_backend::state::AppState;
use registration_backend::storage::ObjectStorage;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    failing: AtomicBool,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("fake storage is unavailable");
        }
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://fake-storage/{key}")
    }
}

#[allow(dead_code)]
impl FakeStorage {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: AtomicBool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("fake mail provider is down");
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }

    /// Background sends are not awaited by the handler, so poll briefly.
    pub async fn wait_for(&self, count: usize) -> Result<Vec<OutboundEmail>> {
        for _ in 0..50 {
            let sent = self.sent().await;
            if sent.len() >= count {
                return Ok(sent);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        bail!("expected {count} emails, saw {}", self.sent().await.len())
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    notifier: Arc<RecordingNotifier>,
}

#[allow(dead_code)]
impl TestApp {
    /// Connects to `TEST_DATABASE_URL`. Returns `None` when it is unset so
    /// database-backed tests skip instead of failing.
    pub async fn new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database-backed test");
            return Ok(None);
        };

        let config = test_config(database_url);
        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;
        Ok(Some(Self::with_pool(pool, config)))
    }

    /// Router over a pool that never connects. Only for requests that are
    /// answered before any store access.
    pub fn offline() -> Self {
        let config = test_config("postgres://offline.invalid/none".to_string());
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(Duration::from_millis(200))
            .build_unchecked(manager);
        Self::with_pool(pool, config)
    }

    fn with_pool(pool: PgPool, config: AppConfig) -> Self {
        let storage = Arc::new(FakeStorage::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let notifier_for_state: Arc<dyn Notifier> = notifier.clone();
        let state = AppState::new(pool, config, storage_for_state, notifier_for_state);
        let router = routes::create_router(state.clone());

        Self {
            state,
            router,
            storage,
            notifier,
        }
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn notifier(&self) -> Arc<RecordingNotifier> {
        self.notifier.clone()
    }

    pub async fn insert_admin(&self, email: &str, password: &str) -> Result<Uuid> {
        let email = email.to_lowercase();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let admin = NewAdminUser {
                id: Uuid::new_v4(),
                email,
                password_hash: hash_password(&password)?,
            };
            diesel::insert_into(admin_users::table)
                .values(&admin)
                .execute(conn)
                .context("failed to insert admin")?;
            Ok(admin.id)
        })
        .await
    }

    /// Logs in and returns the `name=value` pair to send back as `Cookie`.
    pub async fn login_cookie(&self, email: &str, password: &str) -> Result<String> {
        let response = self.login(email, password).await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .context("login response has no Set-Cookie")?
            .to_str()?;
        set_cookie
            .split(';')
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("malformed Set-Cookie: {set_cookie}"))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<hyper::Response<Body>> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        self.post_json("/api/admin/login", &LoginPayload { email, password }, None)
            .await
    }

    /// Submits a registration form. `fields` are sent as text parts in order.
    pub async fn register(
        &self,
        fields: &[(&str, &str)],
        screenshot: Option<(&str, &str, &[u8])>,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }
        if let Some((filename, content_type, data)) = screenshot {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"screenshot\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
            body.extend(data);
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/register")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        self.send(request).await
    }

    /// Registers `fields` and returns the new id, failing on any non-201.
    pub async fn register_ok(&self, fields: &[(&str, &str)]) -> Result<Uuid> {
        let response = self.register(fields, None).await?;
        let status = response.status();
        let body = body_json(response.into_body()).await?;
        ensure!(status == StatusCode::CREATED, "register failed: {status} {body}");
        let id = body["registrationId"]
            .as_str()
            .context("registrationId missing")?;
        Ok(Uuid::parse_str(id)?)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        cookie: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body))?).await
    }

    pub async fn post_bytes(
        &self,
        path: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_vec()))?;
        self.send(request).await
    }

    pub async fn post(&self, path: &str, cookie: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn registration(&self, id: Uuid) -> Result<Registration> {
        self.with_conn(move |conn| {
            registrations::table
                .find(id)
                .select(Registration::as_select())
                .first(conn)
                .context("registration missing")
        })
        .await
    }

    pub async fn registration_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            registrations::table
                .count()
                .get_result(conn)
                .context("failed to count registrations")
        })
        .await
    }

    /// Moves every session's expiry into the past.
    pub async fn expire_sessions(&self) -> Result<()> {
        self.with_conn(|conn| {
            let past = chrono::Utc::now().naive_utc() - chrono::Duration::minutes(1);
            diesel::update(admin_sessions::table)
                .set(admin_sessions::expires_at.eq(past))
                .execute(conn)
                .context("failed to expire sessions")?;
            Ok(())
        })
        .await
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

#[allow(dead_code)]
pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(body: Body) -> Result<Value> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

#[allow(dead_code)]
pub fn asha() -> Vec<(&'static str, &'static str)> {
    vec![
        ("name", "Asha"),
        ("email", "asha@x.com"),
        ("phone", "9876543210"),
        ("roll_college", "AMCH 42"),
        ("utr", "TXN001"),
    ]
}

/// `base` with `field` replaced by `value`.
#[allow(dead_code)]
pub fn with_field<'a>(
    base: &[(&'a str, &'a str)],
    field: &str,
    value: &'a str,
) -> Vec<(&'a str, &'a str)> {
    base.iter()
        .map(|(name, current)| (*name, if *name == field { value } else { *current }))
        .collect()
}

fn test_config(database_url: String) -> AppConfig {
    let mut config = AppConfig::with_defaults(database_url);
    config.server_port = 0;
    config.database_max_pool_size = 8;
    config.s3_bucket = "test-bucket".to_string();
    config
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        db::run_migrations(&mut conn)?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("TRUNCATE TABLE admin_sessions, admin_users, registrations CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}
