//! Scripted collaborators shared by the engine scenario tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gamebook_core::clock::Clock;
use gamebook_core::repository::SessionRepository;
use gamebook_core::rng::DeterministicRng;
use gamebook_session_store::in_memory::InMemorySessionRepository;
use gamebook_test_support::{FixedClock, MockRng, fixed_now};
use gamebook_workflow::application::collaborators::{
    CharacterKeeper, Collaborators, ContentSource, RulesSource, SectionText,
};
use gamebook_workflow::application::engine::{EngineConfig, WorkflowEngine};
use gamebook_workflow::application::stages::StageError;
use gamebook_workflow::application::trace::StepTraceRecorder;
use gamebook_workflow::domain::commands::{AdvanceSession, StartSession};
use gamebook_workflow::domain::dice::{DiceKind, DiceOutcome};
use gamebook_workflow::domain::state::{
    Character, Choice, ChoiceKind, Decision, DiceThresholds, NextAction, Rules, SourceKind,
};
use uuid::Uuid;

pub const GAME: &str = "forest";

fn direct(text: &str, target: u32) -> Choice {
    Choice {
        text: text.to_owned(),
        kind: ChoiceKind::Direct,
        target_section: target,
        conditions: vec![],
        dice_kind: None,
        dice_thresholds: None,
    }
}

fn combat(text: &str, target: u32, min: Option<u32>, max: Option<u32>) -> Choice {
    Choice {
        dice_kind: Some(DiceKind::Combat),
        dice_thresholds: Some(DiceThresholds { min, max }),
        ..direct(text, target)
    }
}

/// Rules of the test book:
///
/// - 1: choose between 48 ("Entrer dans la forêt") and 398 ("Continuer ma route")
/// - 48: a single direct choice back to 1, resolved without input
/// - 398: a combat roll, 8+ to 200, 7 or less to 13
/// - 13, 200: choose to go back to 1
#[must_use]
pub fn book() -> HashMap<u32, Rules> {
    let mut sections = HashMap::new();
    sections.insert(
        1,
        Rules {
            section_number: 1,
            needs_player_input: true,
            next_action: NextAction::Choose,
            choices: vec![
                direct("Entrer dans la forêt", 48),
                direct("Continuer ma route", 398),
            ],
            summary: "Carrefour".into(),
            ..Rules::default()
        },
    );
    sections.insert(
        48,
        Rules {
            section_number: 48,
            next_action: NextAction::Continue,
            choices: vec![direct("Revenir au carrefour", 1)],
            summary: "Sentier".into(),
            ..Rules::default()
        },
    );
    sections.insert(
        398,
        Rules {
            section_number: 398,
            dice_kind: Some(DiceKind::Combat),
            needs_dice: true,
            next_action: NextAction::RollDice,
            choices: vec![
                combat("Victoire", 200, Some(8), None),
                combat("Défaite", 13, None, Some(7)),
            ],
            summary: "Combat contre le loup".into(),
            ..Rules::default()
        },
    );
    for section in [13, 200] {
        sections.insert(
            section,
            Rules {
                section_number: section,
                needs_player_input: true,
                next_action: NextAction::Choose,
                choices: vec![direct("Recommencer", 1)],
                ..Rules::default()
            },
        );
    }
    sections
}

/// Serves rules from [`book`], failing for the sections in `failing`.
pub struct ScriptedRules {
    sections: HashMap<u32, Rules>,
    failing: Mutex<HashSet<u32>>,
    calls: AtomicUsize,
}

impl ScriptedRules {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sections: book(),
            failing: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing_on(section: u32) -> Self {
        let rules = Self::new();
        rules.failing.lock().unwrap().insert(section);
        rules
    }

    pub fn recover(&self, section: u32) {
        self.failing.lock().unwrap().remove(&section);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RulesSource for ScriptedRules {
    async fn rules_for(
        &self,
        _game_id: &str,
        section: u32,
        _content: Option<&str>,
    ) -> Result<Rules, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&section) {
            return Err(StageError::Retrieval(format!(
                "rules index unreachable for section {section}"
            )));
        }
        self.sections
            .get(&section)
            .cloned()
            .ok_or_else(|| StageError::Retrieval(format!("unknown section {section}")))
    }
}

/// Delays the first `remaining` calls of a collaborator.
struct Stall {
    delay: Duration,
    remaining: AtomicUsize,
}

impl Stall {
    fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            remaining: AtomicUsize::new(0),
        }
    }

    fn first(delay: Duration) -> Self {
        Self {
            delay,
            remaining: AtomicUsize::new(1),
        }
    }

    async fn wait(&self) {
        let stalled = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Serves "Section n" for every section. `slow_first` stalls the first fetch.
pub struct ScriptedContent {
    stall: Stall,
}

impl ScriptedContent {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stall: Stall::none(),
        }
    }

    #[must_use]
    pub fn slow_first(delay: Duration) -> Self {
        Self {
            stall: Stall::first(delay),
        }
    }
}

#[async_trait]
impl ContentSource for ScriptedContent {
    async fn content_for(&self, _game_id: &str, section: u32) -> Result<SectionText, StageError> {
        self.stall.wait().await;
        Ok(SectionText {
            content: format!("Section {section}"),
            source_kind: SourceKind::Authored,
        })
    }
}

/// Starts every character with 10 gold and spends one per transition.
/// `slow_first` stalls the first update.
pub struct PurseKeeper {
    stall: Stall,
}

impl PurseKeeper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stall: Stall::none(),
        }
    }

    #[must_use]
    pub fn slow_first(delay: Duration) -> Self {
        Self {
            stall: Stall::first(delay),
        }
    }
}

#[async_trait]
impl CharacterKeeper for PurseKeeper {
    async fn initial_character(&self, _game_id: &str) -> Result<Character, StageError> {
        let mut character = Character::default();
        character.resources.insert("gold".into(), 10);
        Ok(character)
    }

    async fn character_update(
        &self,
        _game_id: &str,
        character: &Character,
        _decision: &Decision,
    ) -> Result<Character, StageError> {
        self.stall.wait().await;
        let mut updated = character.clone();
        *updated.resources.entry("gold".into()).or_insert(0) -= 1;
        Ok(updated)
    }
}

pub struct Harness {
    pub engine: Arc<WorkflowEngine>,
    pub repository: Arc<InMemorySessionRepository>,
    pub rules: Arc<ScriptedRules>,
}

pub fn collaborators(
    rules: Arc<ScriptedRules>,
    content: ScriptedContent,
    keeper: PurseKeeper,
) -> Collaborators {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    Collaborators {
        rules,
        content: Arc::new(content),
        trace: Arc::new(StepTraceRecorder::new(clock)),
        character: Arc::new(keeper),
    }
}

pub fn engine_over(
    repository: Arc<dyn SessionRepository>,
    rules: Arc<ScriptedRules>,
    content: ScriptedContent,
    rng: Box<dyn DeterministicRng>,
    config: EngineConfig,
) -> WorkflowEngine {
    WorkflowEngine::new(
        collaborators(rules, content, PurseKeeper::new()),
        repository,
        Arc::new(FixedClock(fixed_now())),
        rng,
        config,
    )
}

pub fn harness_with(rules: ScriptedRules, content: ScriptedContent, config: EngineConfig) -> Harness {
    harness_with_keeper(rules, content, PurseKeeper::new(), config)
}

pub fn harness_with_keeper(
    rules: ScriptedRules,
    content: ScriptedContent,
    keeper: PurseKeeper,
    config: EngineConfig,
) -> Harness {
    let repository = Arc::new(InMemorySessionRepository::new());
    let rules = Arc::new(rules);
    let engine = WorkflowEngine::new(
        collaborators(Arc::clone(&rules), content, keeper),
        Arc::clone(&repository) as Arc<dyn SessionRepository>,
        Arc::new(FixedClock(fixed_now())),
        Box::new(MockRng),
        config,
    );
    Harness {
        engine: Arc::new(engine),
        repository,
        rules,
    }
}

pub fn harness() -> Harness {
    harness_with(ScriptedRules::new(), ScriptedContent::new(), EngineConfig::default())
}

pub fn advance(session_id: &str, player_input: Option<&str>) -> AdvanceSession {
    AdvanceSession {
        correlation_id: Uuid::new_v4(),
        session_id: session_id.to_owned(),
        player_input: player_input.map(str::to_owned),
        dice_kind: None,
        dice_result: None,
    }
}

pub fn advance_with_total(session_id: &str, total: u32) -> AdvanceSession {
    AdvanceSession {
        dice_result: Some(DiceOutcome::from_total(DiceKind::Combat, total)),
        ..advance(session_id, None)
    }
}

pub fn start() -> StartSession {
    StartSession {
        correlation_id: Uuid::new_v4(),
        game_id: GAME.to_owned(),
    }
}
