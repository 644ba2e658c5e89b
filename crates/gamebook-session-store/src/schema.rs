//! Session store database schema.

/// SQL to create the session documents table.
pub const CREATE_SESSION_STATES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS session_states (
    session_id  TEXT PRIMARY KEY,
    version     BIGINT NOT NULL,
    document    JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_session_states_updated_at
    ON session_states (updated_at);
";
