//! PostgreSQL session store backend (sqlx).
//!
//! One row per session id in `whatsapp_sessions`; `store` is an upsert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use wab_core::{
    domain::SessionId,
    session_store::{SessionBlob, SessionRecord, SessionStore, StoreError, StoreResult},
};

#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

// Build a small pool; the bot issues one query per backup tick.
pub async fn connect_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
    MIGRATOR.run(pool).await
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let db = connect_pool(database_url).await.map_err(unavailable)?;
        run_migrations(&db)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migrations failed: {e}")))?;
        tracing::info!("postgres session store ready");
        Ok(Self::new(db))
    }

    /// Full record including its timestamp.
    pub async fn record(&self, session_id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT session, last_updated FROM whatsapp_sessions WHERE session_id = $1",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(unavailable)?;

        Ok(row.map(|(session, last_updated)| SessionRecord {
            session_id: session_id.clone(),
            blob: SessionBlob(session),
            last_updated,
        }))
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("postgres: {e}"))
}

#[async_trait]
impl SessionStore for PgSessionStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn exists(&self, session_id: &SessionId) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM whatsapp_sessions WHERE session_id = $1)",
        )
        .bind(session_id.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(unavailable)?;
        Ok(exists)
    }

    async fn extract(&self, session_id: &SessionId) -> StoreResult<Option<SessionBlob>> {
        Ok(self.record(session_id).await?.map(|r| r.blob))
    }

    async fn store(&self, session_id: &SessionId, blob: &SessionBlob) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO whatsapp_sessions (session_id, session, last_updated)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id) DO UPDATE SET
                session = EXCLUDED.session,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(session_id.as_str())
        .bind(blob.as_str())
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> StoreResult<()> {
        sqlx::query("DELETE FROM whatsapp_sessions WHERE session_id = $1")
            .bind(session_id.as_str())
            .execute(&self.db)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
