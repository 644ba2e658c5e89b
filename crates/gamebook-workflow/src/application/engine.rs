//! The workflow engine: command and query handlers over the session store.
//!
//! One `advance` call is one step. The step is serialized per session,
//! recomputed from the stored state, fanned out to the relevant stages in
//! bounded rounds, merged, evaluated by the transition machine and committed
//! with an optimistic version check.

use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gamebook_core::clock::Clock;
use gamebook_core::command::Command;
use gamebook_core::error::DomainError;
use gamebook_core::repository::{SessionRepository, StoredSession};
use gamebook_core::rng::DeterministicRng;
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::application::cache::SectionCache;
use crate::application::collaborators::{CharacterKeeper, Collaborators};
use crate::application::locks::SessionLocks;
use crate::application::runner::StageRunner;
use crate::application::stages::{
    DecisionStage, NarrativeStage, RulesStage, Stage, StageError, TraceStage,
};
use crate::domain::commands::{AdvanceSession, ResetSession, RollDice, StartSession};
use crate::domain::dice::{self, DiceKind, DiceOutcome};
use crate::domain::merge::{StageTag, merge_all, merge_partial};
use crate::domain::state::{Rules, SessionPartial, SessionState};
use crate::domain::transition::{
    StepPhase, apply_advance, evaluate, pending_decision, validate_inputs,
};

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Bound on each stage of a round.
    pub stage_timeout: Duration,
    /// Maximum fan-out rounds per step.
    pub max_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(5),
            max_rounds: 4,
        }
    }
}

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// The state after the step.
    pub state: SessionState,
    /// `true` unless the step reached `Advanced`.
    pub pending: bool,
    /// Where the step ended.
    pub phase: StepPhase,
}

enum DiceInput {
    Roll(DiceKind),
    Reported(DiceOutcome),
}

impl DiceInput {
    fn kind(&self) -> DiceKind {
        match self {
            Self::Roll(kind) => *kind,
            Self::Reported(outcome) => outcome.kind,
        }
    }
}

/// Input supplied with an `advance` call that has not been validated yet.
#[derive(Default)]
struct NewInputs {
    player_input: Option<String>,
    dice: Option<DiceInput>,
}

impl NewInputs {
    fn is_empty(&self) -> bool {
        self.player_input.is_none() && self.dice.is_none()
    }
}

/// Coordinates stages, merge, transitions and the store.
pub struct WorkflowEngine {
    runner: StageRunner,
    repository: Arc<dyn SessionRepository>,
    character: Arc<dyn CharacterKeeper>,
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn DeterministicRng>>,
    cache: SectionCache,
    locks: SessionLocks,
    config: EngineConfig,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .field("cached_sections", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Wires an engine.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        repository: Arc<dyn SessionRepository>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
        config: EngineConfig,
    ) -> Self {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(RulesStage::new(collaborators.rules)),
            Arc::new(NarrativeStage::new(collaborators.content, Arc::clone(&clock))),
            Arc::new(DecisionStage),
            Arc::new(TraceStage::new(
                collaborators.trace,
                Arc::clone(&collaborators.character),
            )),
        ];

        Self {
            runner: StageRunner::new(stages, config.stage_timeout),
            repository,
            character: collaborators.character,
            clock,
            rng: Mutex::new(rng),
            cache: SectionCache::new(),
            locks: SessionLocks::new(),
            config,
        }
    }

    /// The section cache.
    #[must_use]
    pub fn cache(&self) -> &SectionCache {
        &self.cache
    }

    /// Handles `StartSession`: creates a session on section 1 and stores it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an empty or unknown game, or a
    /// store error.
    #[instrument(skip(self, command), fields(game_id = %command.game_id, correlation_id = %command.correlation_id, command = command.command_type()))]
    pub async fn handle_start_session(
        &self,
        command: &StartSession,
    ) -> Result<SessionState, DomainError> {
        let game_id = command.game_id.trim();
        if game_id.is_empty() {
            return Err(DomainError::Validation("game_id must not be empty".into()));
        }

        let character = self
            .character
            .initial_character(game_id)
            .await
            .map_err(|e| DomainError::Validation(e.to_string()))?;

        let mut state = SessionState::new(Uuid::new_v4().to_string(), game_id.to_owned(), character);
        self.commit(&mut state, 0).await?;

        info!(session_id = %state.session_id, "session started");
        Ok(state)
    }

    /// The stored state of a session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` for an unknown session.
    pub async fn current_state(&self, session_id: &str) -> Result<SessionState, DomainError> {
        self.load(session_id).await
    }

    /// Handles `AdvanceSession`: runs one workflow step.
    ///
    /// Stage failures do not fail the call; they leave the step pending with
    /// the error recorded in the state. Calling again with no new input when
    /// nothing changed is a no-op that does not touch the store.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` when both a dice kind and a dice result are
    ///   given, or a reported result could not have been rolled.
    /// - `DomainError::UnexpectedInput` when the section does not accept the
    ///   supplied input.
    /// - `DomainError::NoApplicableChoice` when no choice matches; nothing is
    ///   stored.
    /// - `DomainError::SessionNotFound`, `DomainError::StoreConflict` or
    ///   `DomainError::Infrastructure` from the store.
    #[instrument(skip(self, command), fields(session_id = %command.session_id, correlation_id = %command.correlation_id, command = command.command_type()))]
    pub async fn handle_advance(&self, command: &AdvanceSession) -> Result<StepOutcome, DomainError> {
        let dice = match (command.dice_kind, command.dice_result.clone()) {
            (Some(_), Some(_)) => {
                return Err(DomainError::Validation(
                    "supply either dice_kind or dice_result, not both".into(),
                ));
            }
            (Some(kind), None) => Some(DiceInput::Roll(kind)),
            (None, Some(outcome)) => {
                outcome.validate()?;
                Some(DiceInput::Reported(outcome))
            }
            (None, None) => None,
        };
        let player_input = command
            .player_input
            .as_deref()
            .map(str::trim)
            .filter(|input| !input.is_empty())
            .map(str::to_owned);
        let mut inputs = NewInputs { player_input, dice };

        let _guard = self.locks.acquire(&command.session_id).await;

        let original = self.load(&command.session_id).await?;
        let mut state = original.clone();
        state.error = None;

        let mut ran = BTreeSet::new();
        let mut trace_recorded = false;
        for round in 0..self.config.max_rounds {
            self.prime_from_cache(&mut state);
            if !inputs.is_empty() {
                if let Some(rules) = state.fresh_rules().cloned() {
                    self.accept_inputs(&mut state, &rules, mem::take(&mut inputs))?;
                }
            }

            if self.runner.relevant(&state, &ran).is_empty() {
                break;
            }

            let snapshot = Arc::new(state.clone());
            let reports = self.runner.run(Arc::clone(&snapshot), &ran).await;
            let now = self.clock.now();

            let mut contributions = Vec::with_capacity(reports.len());
            for report in reports {
                if let Err(StageError::NoApplicableChoice { section }) = &report.outcome {
                    info!(section, "no applicable choice, state left unchanged");
                    return Err(DomainError::NoApplicableChoice { section: *section });
                }
                if report.tag == StageTag::Trace && report.outcome.is_ok() {
                    trace_recorded = true;
                }
                ran.insert(report.tag);
                contributions.push((report.tag, report.into_partial(&snapshot, now)));
            }
            debug!(round, stages = contributions.len(), "round merged");

            merge_all(&mut state, contributions);
            self.remember(&state);
        }

        if !inputs.is_empty() {
            match state.fresh_rules().cloned() {
                Some(rules) => self.accept_inputs(&mut state, &rules, mem::take(&mut inputs))?,
                None => debug!("rules unavailable, new input not kept"),
            }
        }

        let phase = Self::finish_step(&mut state, trace_recorded);

        if state != original {
            self.commit(&mut state, original.version).await?;
        }

        info!(
            section = state.section_number,
            phase = ?phase,
            version = state.version,
            "step finished"
        );

        Ok(StepOutcome {
            pending: phase.is_pending(),
            state,
            phase,
        })
    }

    /// Handles `RollDice`: rolls for an existing session without touching
    /// its state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` for an unknown session.
    #[instrument(skip(self, command), fields(session_id = %command.session_id, correlation_id = %command.correlation_id, command = command.command_type()))]
    pub async fn handle_roll_dice(&self, command: &RollDice) -> Result<DiceOutcome, DomainError> {
        self.load(&command.session_id).await?;
        let outcome = self.roll(command.dice_kind);
        info!(kind = %outcome.kind, total = outcome.total, "dice rolled");
        Ok(outcome)
    }

    /// Handles `ResetSession`: section 1, empty history, initial character.
    /// Identifiers are kept and the version moves forward.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` for an unknown session, or a
    /// store error.
    #[instrument(skip(self, command), fields(session_id = %command.session_id, correlation_id = %command.correlation_id, command = command.command_type()))]
    pub async fn handle_reset_session(
        &self,
        command: &ResetSession,
    ) -> Result<SessionState, DomainError> {
        let _guard = self.locks.acquire(&command.session_id).await;

        let original = self.load(&command.session_id).await?;
        let character = self
            .character
            .initial_character(&original.game_id)
            .await
            .map_err(|e| DomainError::Validation(e.to_string()))?;

        let mut state = SessionState::new(original.session_id, original.game_id, character);
        self.commit(&mut state, original.version).await?;

        info!(version = state.version, "session reset");
        Ok(state)
    }

    /// Drops cached rules and narrative of `sections` after their content
    /// changed. Returns how many cache entries were dropped.
    pub fn invalidate_sections(&self, game_id: &str, sections: &[u32]) -> usize {
        let removed = self.cache.invalidate(game_id, sections);
        info!(game_id, requested = sections.len(), removed, "section cache invalidated");
        removed
    }

    async fn load(&self, session_id: &str) -> Result<SessionState, DomainError> {
        let stored = self
            .repository
            .load(session_id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(session_id.to_owned()))?;
        let mut state = SessionState::from_document(stored.document)?;
        state.version = stored.version;
        Ok(state)
    }

    async fn commit(&self, state: &mut SessionState, expected_version: i64) -> Result<(), DomainError> {
        state.version = expected_version + 1;
        let stored = StoredSession {
            session_id: state.session_id.clone(),
            version: state.version,
            document: state.to_document()?,
            updated_at: self.clock.now(),
        };
        self.repository.save(&stored, expected_version).await
    }

    fn roll(&self, kind: DiceKind) -> DiceOutcome {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        dice::roll(kind, &mut **rng)
    }

    fn accept_inputs(
        &self,
        state: &mut SessionState,
        rules: &Rules,
        inputs: NewInputs,
    ) -> Result<(), DomainError> {
        validate_inputs(
            rules,
            inputs.player_input.as_deref(),
            inputs.dice.as_ref().map(DiceInput::kind),
        )?;

        let partial = SessionPartial {
            player_input: inputs.player_input,
            ..SessionPartial::default()
        };
        merge_partial(state, StageTag::Decision, partial);
        if let Some(dice) = inputs.dice {
            state.dice_result = Some(match dice {
                DiceInput::Roll(kind) => self.roll(kind),
                DiceInput::Reported(outcome) => outcome,
            });
        }
        Ok(())
    }

    fn prime_from_cache(&self, state: &mut SessionState) {
        let section = state.section_number;
        if state.fresh_rules().is_none() {
            if let Some(rules) = self.cache.rules(&state.game_id, section) {
                debug!(section, "rules served from cache");
                let partial = SessionPartial {
                    rules: Some(rules),
                    ..SessionPartial::default()
                };
                merge_partial(state, StageTag::Rules, partial);
            }
        }
        if state.fresh_narrative().is_none() {
            if let Some(narrative) = self.cache.narrative(&state.game_id, section) {
                debug!(section, "narrative served from cache");
                let partial = SessionPartial {
                    narrative: Some(narrative),
                    ..SessionPartial::default()
                };
                merge_partial(state, StageTag::Narrative, partial);
            }
        }
    }

    fn remember(&self, state: &SessionState) {
        if let Some(rules) = state.fresh_rules() {
            self.cache.remember_rules(&state.game_id, rules);
        }
        if let Some(narrative) = state.fresh_narrative() {
            self.cache.remember_narrative(&state.game_id, narrative);
        }
    }

    /// Evaluates the merged state and applies the transition when the step
    /// resolved and its trace stage completed, in this call or an earlier one.
    /// A trace stage that timed out or panicked leaves the step pending.
    fn finish_step(state: &mut SessionState, trace_recorded: bool) -> StepPhase {
        let phase = evaluate(state);

        let traced = trace_recorded || state.trace.contains(&state.current_action_id());
        if phase == StepPhase::Resolving && traced {
            if let Some(next) = apply_advance(state) {
                debug!(next, "section advanced");
                return StepPhase::Advanced;
            }
        }

        if phase == StepPhase::AwaitingDiceOrInput {
            if let Some(rules) = state.fresh_rules() {
                let decision = pending_decision(state, rules);
                state.decision = Some(decision);
            }
        }
        phase
    }
}
