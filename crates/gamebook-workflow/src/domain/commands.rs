//! Commands accepted by the workflow engine.

use gamebook_core::command::Command;
use uuid::Uuid;

use super::dice::{DiceKind, DiceOutcome};

/// Command to start a new session on section 1 of a book.
#[derive(Debug, Clone)]
pub struct StartSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The book to play.
    pub game_id: String,
}

impl Command for StartSession {
    fn command_type(&self) -> &'static str {
        "workflow.start_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to run one step of the workflow.
///
/// `dice_kind` asks the engine to roll on the player's behalf; `dice_result`
/// reports a roll made elsewhere. At most one of the two may be set.
#[derive(Debug, Clone)]
pub struct AdvanceSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to advance.
    pub session_id: String,
    /// Free-form player response.
    pub player_input: Option<String>,
    /// Die kind to roll before advancing.
    pub dice_kind: Option<DiceKind>,
    /// Externally produced dice result.
    pub dice_result: Option<DiceOutcome>,
}

impl Command for AdvanceSession {
    fn command_type(&self) -> &'static str {
        "workflow.advance_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to roll dice for a session without advancing it.
#[derive(Debug, Clone)]
pub struct RollDice {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session the roll is for.
    pub session_id: String,
    /// Die kind to roll.
    pub dice_kind: DiceKind,
}

impl Command for RollDice {
    fn command_type(&self) -> &'static str {
        "workflow.roll_dice"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to put a session back on section 1 with an empty history.
#[derive(Debug, Clone)]
pub struct ResetSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to reset.
    pub session_id: String,
}

impl Command for ResetSession {
    fn command_type(&self) -> &'static str {
        "workflow.reset_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
