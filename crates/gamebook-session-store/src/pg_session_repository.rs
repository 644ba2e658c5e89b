//! `PostgreSQL` implementation of the `SessionRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};

use gamebook_core::error::DomainError;
use gamebook_core::repository::{SessionRepository, StoredSession};

type SessionRow = (String, i64, serde_json::Value, DateTime<Utc>);

fn infrastructure(err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {err}"))
}

/// PostgreSQL-backed session repository storing one JSONB document per
/// session.
#[derive(Debug, Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Creates a new `PgSessionRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, session_id: &str) -> Result<i64, DomainError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM session_states WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| infrastructure(&e))?;
        Ok(version.unwrap_or(0))
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn load(&self, session_id: &str) -> Result<Option<StoredSession>, DomainError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT session_id, version, document, updated_at \
             FROM session_states WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| infrastructure(&e))?;

        Ok(row.map(|(session_id, version, document, updated_at)| StoredSession {
            session_id,
            version,
            document,
            updated_at,
        }))
    }

    async fn save(
        &self,
        session: &StoredSession,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let outcome = if expected_version == 0 {
            sqlx::query(
                "INSERT INTO session_states (session_id, version, document, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (session_id) DO NOTHING",
            )
            .bind(&session.session_id)
            .bind(session.version)
            .bind(&session.document)
            .bind(session.updated_at)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                "UPDATE session_states \
                 SET version = $2, document = $3, updated_at = $4 \
                 WHERE session_id = $1 AND version = $5",
            )
            .bind(&session.session_id)
            .bind(session.version)
            .bind(&session.document)
            .bind(session.updated_at)
            .bind(expected_version)
            .execute(&self.pool)
            .await
        };
        let result = outcome.map_err(|e| infrastructure(&e))?;

        if result.rows_affected() == 0 {
            let actual = self.current_version(&session.session_id).await?;
            warn!(
                session_id = %session.session_id,
                expected = expected_version,
                actual,
                "rejected session write with stale version"
            );
            return Err(DomainError::StoreConflict {
                session_id: session.session_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        debug!(
            session_id = %session.session_id,
            version = session.version,
            "session document committed"
        );
        Ok(())
    }
}
