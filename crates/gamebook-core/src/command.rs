//! Commands accepted by the engine.

use uuid::Uuid;

/// A request to change or inspect a session, carried with a correlation id
/// so one call can be followed across stages in the logs.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable dotted name, e.g. `workflow.advance_session`.
    fn command_type(&self) -> &'static str;

    /// Identifier shared by every log line of one call.
    fn correlation_id(&self) -> Uuid;
}
