//! Ports to the engine's external collaborators.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::stages::StageError;
use crate::domain::state::{ActionRecord, Character, Decision, Rules, SessionState, SourceKind, TraceStats};

/// Narrative text for one section as delivered by a content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionText {
    /// Plain text.
    pub content: String,
    /// Origin of the text.
    pub source_kind: SourceKind,
}

/// History contribution of one resolved step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TracePartial {
    /// Actions to append.
    pub actions: Vec<ActionRecord>,
    /// Updated counters.
    pub stats: TraceStats,
    /// Updated observations.
    pub insights: Option<String>,
}

/// Retrieves the rules that apply to a section.
#[async_trait]
pub trait RulesSource: Send + Sync {
    /// Rules for `section` of `game_id`. `content` is the section's narrative
    /// text when it is already known.
    ///
    /// # Errors
    ///
    /// Returns `StageError::Retrieval` when the rules cannot be obtained.
    async fn rules_for(
        &self,
        game_id: &str,
        section: u32,
        content: Option<&str>,
    ) -> Result<Rules, StageError>;
}

/// Produces the narrative text of a section.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Text for `section` of `game_id`.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ContentUnavailable` when no text can be produced.
    async fn content_for(&self, game_id: &str, section: u32) -> Result<SectionText, StageError>;
}

/// Turns a resolved step into history.
pub trait TraceRecorder: Send + Sync {
    /// History entries for the step resolved in `state`.
    ///
    /// # Errors
    ///
    /// Returns `StageError::Internal` when `state` holds no resolved decision.
    /// Callers only log this.
    fn trace_record(&self, state: &SessionState) -> Result<TracePartial, StageError>;
}

/// Owns the player character.
#[async_trait]
pub trait CharacterKeeper: Send + Sync {
    /// Character a new session of `game_id` starts with.
    ///
    /// # Errors
    ///
    /// Returns a `StageError` when the game is unknown.
    async fn initial_character(&self, _game_id: &str) -> Result<Character, StageError> {
        Ok(Character::default())
    }

    /// Character after `decision` has been taken.
    ///
    /// # Errors
    ///
    /// Returns a `StageError` when the update cannot be computed.
    async fn character_update(
        &self,
        game_id: &str,
        character: &Character,
        decision: &Decision,
    ) -> Result<Character, StageError>;
}

/// The full set of collaborators an engine is wired with.
#[derive(Clone)]
pub struct Collaborators {
    /// Rules retrieval.
    pub rules: Arc<dyn RulesSource>,
    /// Narrative content.
    pub content: Arc<dyn ContentSource>,
    /// History bookkeeping.
    pub trace: Arc<dyn TraceRecorder>,
    /// Character bookkeeping.
    pub character: Arc<dyn CharacterKeeper>,
}
