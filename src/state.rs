use std::sync::Arc;

use anyhow::anyhow;
use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::session::SessionAuthenticator, config::AppConfig, db::PgPool, notifier::Notifier,
    storage::ObjectStorage,
};

pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: SessionAuthenticator,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sessions = SessionAuthenticator::new(pool.clone(), config.session_ttl_hours);
        Self {
            pool,
            config: Arc::new(config),
            storage,
            notifier,
            sessions,
        }
    }

    pub fn db(&self) -> anyhow::Result<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| anyhow!("database pool error: {err}"))
    }
}
