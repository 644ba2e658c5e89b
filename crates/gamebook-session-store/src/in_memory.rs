//! In-memory implementation of the `SessionRepository` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use gamebook_core::error::DomainError;
use gamebook_core::repository::{SessionRepository, StoredSession};

/// Process-local session store. Suitable for a single API node and for tests.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl InMemorySessionRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently stored.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, DomainError> {
        Ok(self.lock()?.len())
    }

    /// Returns `true` when no session has been stored.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredSession>>, DomainError> {
        self.sessions
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("session store poisoned: {e}")))
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load(&self, session_id: &str) -> Result<Option<StoredSession>, DomainError> {
        Ok(self.lock()?.get(session_id).cloned())
    }

    async fn save(
        &self,
        session: &StoredSession,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let mut sessions = self.lock()?;
        let actual = sessions.get(&session.session_id).map_or(0, |s| s.version);
        if actual != expected_version {
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
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}
