//! Test repositories: mock `SessionRepository` implementations for tests.

use async_trait::async_trait;
use gamebook_core::error::DomainError;
use gamebook_core::repository::{SessionRepository, StoredSession};

/// A session repository that always returns an infrastructure error. Useful
/// for testing error-handling paths.
#[derive(Debug)]
pub struct FailingSessionRepository;

#[async_trait]
impl SessionRepository for FailingSessionRepository {
    async fn load(&self, _session_id: &str) -> Result<Option<StoredSession>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn save(
        &self,
        _session: &StoredSession,
        _expected_version: i64,
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// A session repository that serves a fixed document on `load` and rejects
/// every `save` with a `StoreConflict`, as if another writer had committed
/// first.
#[derive(Debug)]
pub struct ConflictingSessionRepository {
    stored: Option<StoredSession>,
}

impl ConflictingSessionRepository {
    /// Create a repository that returns `stored` from every `load`.
    #[must_use]
    pub fn new(stored: Option<StoredSession>) -> Self {
        Self { stored }
    }
}

#[async_trait]
impl SessionRepository for ConflictingSessionRepository {
    async fn load(&self, _session_id: &str) -> Result<Option<StoredSession>, DomainError> {
        Ok(self.stored.clone())
    }

    async fn save(
        &self,
        session: &StoredSession,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        Err(DomainError::StoreConflict {
            session_id: session.session_id.clone(),
            expected: expected_version,
            actual: expected_version + 1,
        })
    }
}
