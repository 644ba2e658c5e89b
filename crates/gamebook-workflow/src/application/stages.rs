//! The four analysis stages run for every step.
//!
//! A stage reads an immutable snapshot of the session and returns a partial.
//! It never writes to the session itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gamebook_core::clock::Clock;
use gamebook_core::error::DomainError;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::collaborators::{CharacterKeeper, ContentSource, RulesSource, TraceRecorder};
use crate::domain::merge::StageTag;
use crate::domain::state::{Narrative, SessionPartial, SessionState};
use crate::domain::transition::{inputs_satisfied, resolve_decision};

/// Stage-local failures. These are folded into the session state as error
/// partials and never abort a step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The stage did not finish within the runner's bound.
    #[error("stage {stage} timed out after {after:?}")]
    Timeout {
        /// The stage that timed out.
        stage: StageTag,
        /// The bound it exceeded.
        after: Duration,
    },

    /// The rules for a section could not be retrieved.
    #[error("rules retrieval failed: {0}")]
    Retrieval(String),

    /// No narrative text could be produced for a section.
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),

    /// No choice of the section matched the input.
    #[error("no applicable choice in section {section}")]
    NoApplicableChoice {
        /// The section whose choices were evaluated.
        section: u32,
    },

    /// The stage failed unexpectedly (panicked task, broken invariant).
    #[error("stage {stage} failed: {message}")]
    Internal {
        /// The failing stage.
        stage: StageTag,
        /// What went wrong.
        message: String,
    },
}

/// One analysis stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is.
    fn tag(&self) -> StageTag;

    /// Whether the stage has anything to contribute for `state`.
    fn is_relevant(&self, state: &SessionState) -> bool;

    /// Produces the stage's partial for `snapshot`.
    async fn run(&self, snapshot: Arc<SessionState>) -> Result<SessionPartial, StageError>;
}

/// Retrieves the rules of the current section.
pub struct RulesStage {
    source: Arc<dyn RulesSource>,
}

impl RulesStage {
    /// Creates the stage over a rules source.
    #[must_use]
    pub fn new(source: Arc<dyn RulesSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Stage for RulesStage {
    fn tag(&self) -> StageTag {
        StageTag::Rules
    }

    fn is_relevant(&self, state: &SessionState) -> bool {
        state.fresh_rules().is_none()
    }

    async fn run(&self, snapshot: Arc<SessionState>) -> Result<SessionPartial, StageError> {
        let section = snapshot.section_number;
        let content = snapshot.fresh_narrative().map(|n| n.content.as_str());
        let mut rules = self
            .source
            .rules_for(&snapshot.game_id, section, content)
            .await?;
        rules.section_number = section;

        debug!(
            section,
            needs_dice = rules.needs_dice,
            needs_player_input = rules.needs_player_input,
            "rules retrieved"
        );

        Ok(SessionPartial {
            rules: Some(rules),
            ..SessionPartial::default()
        })
    }
}

/// Fetches the narrative text of the current section.
pub struct NarrativeStage {
    source: Arc<dyn ContentSource>,
    clock: Arc<dyn Clock>,
}

impl NarrativeStage {
    /// Creates the stage over a content source.
    #[must_use]
    pub fn new(source: Arc<dyn ContentSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }
}

#[async_trait]
impl Stage for NarrativeStage {
    fn tag(&self) -> StageTag {
        StageTag::Narrative
    }

    fn is_relevant(&self, state: &SessionState) -> bool {
        state.fresh_narrative().is_none()
    }

    async fn run(&self, snapshot: Arc<SessionState>) -> Result<SessionPartial, StageError> {
        let section = snapshot.section_number;
        let text = self.source.content_for(&snapshot.game_id, section).await?;

        Ok(SessionPartial {
            narrative: Some(Narrative {
                section_number: section,
                content: text.content,
                source_kind: text.source_kind,
                error: None,
                last_update: self.clock.now(),
            }),
            ..SessionPartial::default()
        })
    }
}

/// Maps input and dice onto the section's choices.
#[derive(Debug, Default)]
pub struct DecisionStage;

#[async_trait]
impl Stage for DecisionStage {
    fn tag(&self) -> StageTag {
        StageTag::Decision
    }

    fn is_relevant(&self, state: &SessionState) -> bool {
        state.resolved_decision().is_none()
            && state
                .fresh_rules()
                .is_some_and(|rules| inputs_satisfied(rules, state))
    }

    async fn run(&self, snapshot: Arc<SessionState>) -> Result<SessionPartial, StageError> {
        let rules = snapshot.fresh_rules().ok_or_else(|| StageError::Internal {
            stage: StageTag::Decision,
            message: "no rules for the current section".into(),
        })?;

        let decision = resolve_decision(&snapshot, rules).map_err(|e| match e {
            DomainError::NoApplicableChoice { section } => {
                StageError::NoApplicableChoice { section }
            }
            other => StageError::Internal {
                stage: StageTag::Decision,
                message: other.to_string(),
            },
        })?;

        Ok(SessionPartial {
            decision: Some(decision),
            ..SessionPartial::default()
        })
    }
}

/// Records the resolved step in the history and updates the character.
pub struct TraceStage {
    recorder: Arc<dyn TraceRecorder>,
    keeper: Arc<dyn CharacterKeeper>,
}

impl TraceStage {
    /// Creates the stage over a recorder and a character keeper.
    #[must_use]
    pub fn new(recorder: Arc<dyn TraceRecorder>, keeper: Arc<dyn CharacterKeeper>) -> Self {
        Self { recorder, keeper }
    }
}

#[async_trait]
impl Stage for TraceStage {
    fn tag(&self) -> StageTag {
        StageTag::Trace
    }

    fn is_relevant(&self, state: &SessionState) -> bool {
        state.resolved_decision().is_some() && !state.trace.contains(&state.current_action_id())
    }

    async fn run(&self, snapshot: Arc<SessionState>) -> Result<SessionPartial, StageError> {
        let decision = snapshot.resolved_decision().ok_or_else(|| StageError::Internal {
            stage: StageTag::Trace,
            message: "no resolved decision to record".into(),
        })?;

        let mut partial = SessionPartial::default();

        match self.recorder.trace_record(&snapshot) {
            Ok(trace) => {
                partial.trace_actions = trace.actions;
                partial.trace_stats = Some(trace.stats);
                partial.insights = trace.insights;
            }
            Err(e) => warn!(section = snapshot.section_number, error = %e, "trace recording failed"),
        }

        match self
            .keeper
            .character_update(&snapshot.game_id, &snapshot.character, decision)
            .await
        {
            Ok(character) => partial.character = Some(character),
            Err(e) => {
                warn!(section = snapshot.section_number, error = %e, "character update failed");
                partial.error = Some(e.to_string());
            }
        }

        Ok(partial)
    }
}
