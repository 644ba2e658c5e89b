//! Single-writer-per-session discipline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per session id. Holding the guard serializes every
/// mutating operation on that session until the store write is committed.
/// A session's entry goes away once its last guard and waiter are gone.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one session, released on drop.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.table();
        // Waiters hold a clone, so a count of one means only the table is left.
        if locks
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.session_id);
        }
    }
}

impl SessionLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `session_id`.
    pub async fn acquire(&self, session_id: &str) -> SessionGuard<'_> {
        let lock = Arc::clone(self.table().entry(session_id.to_owned()).or_default());
        let guard = lock.lock_owned().await;
        SessionGuard {
            locks: self,
            session_id: session_id.to_owned(),
            guard: Some(guard),
        }
    }

    /// Number of sessions currently locked or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no session is locked or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_acquire_waits_for_first_guard() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s-1").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("s-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_released_sessions_leave_the_table() {
        let locks = SessionLocks::new();

        for n in 0..100 {
            let _guard = locks.acquire(&format!("s-{n}")).await;
            assert_eq!(locks.len(), 1);
        }

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s-1").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("s-1").await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(contender.await.unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_sessions_do_not_block_each_other() {
        let locks = SessionLocks::new();

        let _first = locks.acquire("s-1").await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire("s-2")).await;

        assert!(second.is_ok());
    }
}
