//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
///
/// Stage-local failures (timeouts, retrieval errors) never surface here; they
/// are folded into the session state. Everything in this enum is either a
/// caller error or a fatal condition for the call.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No session exists for the identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A second writer committed the session in between our read and write.
    #[error("store conflict on session {session_id}: expected version {expected}, found {actual}")]
    StoreConflict {
        /// The session that had the conflict.
        session_id: String,
        /// The version the writer read.
        expected: i64,
        /// The version found in the store.
        actual: i64,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested die kind is not known.
    #[error("invalid dice kind: {0}")]
    InvalidDiceKind(String),

    /// Input was supplied that the current section does not accept.
    #[error("unexpected input: {0}")]
    UnexpectedInput(String),

    /// No choice of the current section matches the supplied input.
    #[error("no applicable choice in section {section}")]
    NoApplicableChoice {
        /// The section whose choices were evaluated.
        section: u32,
    },

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
