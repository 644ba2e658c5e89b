//! Session repository abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;

/// Stored representation of a session document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    /// Session identifier (document key).
    pub session_id: String,
    /// Version of this document. Incremented on every commit.
    pub version: i64,
    /// Serialized session state.
    pub document: serde_json::Value,
    /// Timestamp of the commit that produced this version.
    pub updated_at: DateTime<Utc>,
}

/// Repository trait for loading and saving session documents.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Load the latest document for a session, if any.
    async fn load(&self, session_id: &str) -> Result<Option<StoredSession>, DomainError>;

    /// Save a document with optimistic concurrency.
    /// `expected_version` is the last known version (`0` for a new session).
    ///
    /// Returns `DomainError::StoreConflict` when the stored version differs.
    async fn save(&self, session: &StoredSession, expected_version: i64)
    -> Result<(), DomainError>;
}
