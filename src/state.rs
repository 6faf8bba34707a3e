use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::audit::{AuditSink, LogAuditSink};
use crate::auth::repo::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use crate::config::AppConfig;
use crate::prescriptions::repo::{MemoryPrescriptionStore, PgPrescriptionStore, PrescriptionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn CredentialStore>,
    pub prescriptions: Arc<dyn PrescriptionStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        match config.database_url.clone() {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(&url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("run migrations")?;
                info!("connected to postgres");
                Ok(Self::from_parts(
                    config,
                    Arc::new(PgCredentialStore::new(pool.clone())),
                    Arc::new(PgPrescriptionStore::new(pool)),
                    Arc::new(LogAuditSink),
                ))
            }
            None => {
                warn!("DATABASE_URL not set, running with in-memory stores (demo mode)");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn CredentialStore>,
        prescriptions: Arc<dyn PrescriptionStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            users,
            prescriptions,
            audit,
        }
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        Self::from_parts(
            config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryPrescriptionStore::new()),
            Arc::new(LogAuditSink),
        )
    }
}
