//! The canonical session state and the partial updates stages produce.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gamebook_core::error::DomainError;
use serde::{Deserialize, Serialize};

use super::dice::{DiceKind, DiceOutcome};

/// Where a section's narrative text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Authored text taken verbatim from the book.
    #[default]
    Authored,
    /// Text produced by a generator.
    Generated,
}

/// Narrative text for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    /// The section this text belongs to.
    pub section_number: u32,
    /// Plain text to present.
    pub content: String,
    /// Origin of the text.
    pub source_kind: SourceKind,
    /// Set when the content stage failed for this section.
    #[serde(default)]
    pub error: Option<String>,
    /// When the text was produced.
    pub last_update: DateTime<Utc>,
}

impl Narrative {
    /// A placeholder recording that the content stage failed.
    #[must_use]
    pub fn unavailable(section_number: u32, error: String, at: DateTime<Utc>) -> Self {
        Self {
            section_number,
            content: String::new(),
            source_kind: SourceKind::Authored,
            error: Some(error),
            last_update: at,
        }
    }

    /// Whether this narrative is usable for `section`.
    #[must_use]
    pub fn is_fresh_for(&self, section: u32) -> bool {
        self.section_number == section && self.error.is_none()
    }
}

/// What the section expects to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// The section resolves on its own.
    #[default]
    Continue,
    /// A die must be rolled.
    RollDice,
    /// The player must pick a choice.
    Choose,
}

/// Whether a choice is always available or gated by conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceKind {
    /// Always available.
    #[default]
    Direct,
    /// Available only while all its conditions hold.
    Conditional,
}

/// Inclusive bounds on a dice total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiceThresholds {
    /// Lowest matching total.
    #[serde(default)]
    pub min: Option<u32>,
    /// Highest matching total.
    #[serde(default)]
    pub max: Option<u32>,
}

impl DiceThresholds {
    /// Whether `total` lies within the bounds.
    #[must_use]
    pub fn contains(&self, total: u32) -> bool {
        self.min.is_none_or(|min| total >= min) && self.max.is_none_or(|max| total <= max)
    }
}

/// One way out of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Text shown to the player; also what player input is matched against.
    pub text: String,
    /// Direct or conditional.
    #[serde(default)]
    pub kind: ChoiceKind,
    /// Section reached by taking this choice.
    pub target_section: u32,
    /// Conditions gating a conditional choice.
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Die kind this choice is tied to, if any.
    #[serde(default)]
    pub dice_kind: Option<DiceKind>,
    /// Dice totals that select this choice.
    #[serde(default)]
    pub dice_thresholds: Option<DiceThresholds>,
}

/// The rules that apply to one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Rules {
    /// The section these rules describe.
    pub section_number: u32,
    /// Die kind the section calls for.
    #[serde(default)]
    pub dice_kind: Option<DiceKind>,
    /// A dice result is required before resolving.
    #[serde(default)]
    pub needs_dice: bool,
    /// A player response is required before resolving.
    #[serde(default)]
    pub needs_player_input: bool,
    /// What the section expects next.
    #[serde(default)]
    pub next_action: NextAction,
    /// Section-level conditions, in declaration order.
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Choices, in declaration order.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Short description of the section's mechanics.
    #[serde(default)]
    pub summary: String,
    /// Set when the rules stage failed for this section.
    #[serde(default)]
    pub error: Option<String>,
}

impl Rules {
    /// A placeholder recording that the rules stage failed.
    #[must_use]
    pub fn unavailable(section_number: u32, error: String) -> Self {
        Self {
            section_number,
            error: Some(error),
            ..Self::default()
        }
    }

    /// Whether these rules are usable for `section`.
    #[must_use]
    pub fn is_fresh_for(&self, section: u32) -> bool {
        self.section_number == section && self.error.is_none()
    }
}

/// The outcome of interpreting player input and dice against the rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Section the decision was taken in.
    pub section_number: u32,
    /// Step the decision was taken in.
    pub step: u64,
    /// Section to move to; `None` while still waiting.
    pub next_section: Option<u32>,
    /// What the engine is waiting for, if anything.
    pub awaiting_action: Option<NextAction>,
    /// Conditions of the selected choice.
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Human-readable summary.
    #[serde(default)]
    pub summary: String,
}

impl Decision {
    /// Whether this decision picks a next section for `(section, step)`.
    #[must_use]
    pub fn is_resolved_for(&self, section: u32, step: u64) -> bool {
        self.section_number == section && self.step == step && self.next_section.is_some()
    }
}

/// Identity of an action record: one action per completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId {
    /// Step in which the action was taken.
    pub step: u64,
    /// Section the action left.
    pub section_number: u32,
}

/// One entry of the append-only action history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Identity used for deduplication.
    pub id: ActionId,
    /// Section the action left.
    pub section_number: u32,
    /// Section the action led to.
    pub next_section: u32,
    /// Player input consumed by the action.
    #[serde(default)]
    pub player_input: Option<String>,
    /// Dice outcome consumed by the action.
    #[serde(default)]
    pub dice: Option<DiceOutcome>,
    /// Summary copied from the decision.
    #[serde(default)]
    pub summary: String,
    /// When the action was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Running counters over the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TraceStats {
    /// Sections left through a resolved decision.
    pub sections_visited: u32,
    /// Decisions that consumed a dice result.
    pub dice_rolls: u32,
    /// Decisions that consumed player input.
    pub choices_made: u32,
}

/// Session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Trace {
    /// Append-only action history.
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
    /// Running counters.
    #[serde(default)]
    pub stats: TraceStats,
    /// Free-form observations about the run.
    #[serde(default)]
    pub insights: Option<String>,
}

impl Trace {
    /// Whether an action with `id` has been recorded.
    #[must_use]
    pub fn contains(&self, id: &ActionId) -> bool {
        self.actions.iter().any(|a| a.id == *id)
    }
}

/// Attribute, resource and inventory snapshot of the player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Character {
    /// Fixed attributes (skill, stamina, luck...).
    #[serde(default)]
    pub attributes: BTreeMap<String, i32>,
    /// Consumable resources (gold, provisions...).
    #[serde(default)]
    pub resources: BTreeMap<String, i32>,
    /// Carried items.
    #[serde(default)]
    pub inventory: Vec<String>,
}

impl Character {
    /// Case-insensitive inventory lookup.
    #[must_use]
    pub fn has_item(&self, item: &str) -> bool {
        let item = item.trim();
        self.inventory.iter().any(|i| i.eq_ignore_ascii_case(item))
    }

    /// Value of an attribute or, failing that, a resource.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<i32> {
        let name = name.trim();
        self.attributes
            .iter()
            .chain(self.resources.iter())
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

/// The canonical, versioned session aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session identifier.
    pub session_id: String,
    /// Identifier of the book being played.
    pub game_id: String,
    /// The currently active section.
    pub section_number: u32,
    /// Stored version; `0` until first committed.
    #[serde(default)]
    pub version: i64,
    /// Number of completed steps.
    #[serde(default)]
    pub step: u64,
    /// Narrative for the current (or last fetched) section.
    #[serde(default)]
    pub narrative: Option<Narrative>,
    /// Rules for the current (or last fetched) section.
    #[serde(default)]
    pub rules: Option<Rules>,
    /// Latest decision.
    #[serde(default)]
    pub decision: Option<Decision>,
    /// History and counters.
    #[serde(default)]
    pub trace: Trace,
    /// Player character.
    #[serde(default)]
    pub character: Character,
    /// Unconsumed player input.
    #[serde(default)]
    pub player_input: Option<String>,
    /// Unconsumed dice outcome.
    #[serde(default)]
    pub dice_result: Option<DiceOutcome>,
    /// Error raised during the latest step.
    #[serde(default)]
    pub error: Option<String>,
}

impl SessionState {
    /// A new session positioned on section 1 with an empty history.
    #[must_use]
    pub fn new(session_id: String, game_id: String, character: Character) -> Self {
        Self {
            session_id,
            game_id,
            section_number: 1,
            version: 0,
            step: 0,
            narrative: None,
            rules: None,
            decision: None,
            trace: Trace::default(),
            character,
            player_input: None,
            dice_result: None,
            error: None,
        }
    }

    /// Rules usable for the current section.
    #[must_use]
    pub fn fresh_rules(&self) -> Option<&Rules> {
        self.rules
            .as_ref()
            .filter(|r| r.is_fresh_for(self.section_number))
    }

    /// Narrative usable for the current section.
    #[must_use]
    pub fn fresh_narrative(&self) -> Option<&Narrative> {
        self.narrative
            .as_ref()
            .filter(|n| n.is_fresh_for(self.section_number))
    }

    /// The decision resolving the current step, if one has been taken.
    #[must_use]
    pub fn resolved_decision(&self) -> Option<&Decision> {
        self.decision
            .as_ref()
            .filter(|d| d.is_resolved_for(self.section_number, self.step))
    }

    /// Identity of the action the current step will record.
    #[must_use]
    pub fn current_action_id(&self) -> ActionId {
        ActionId {
            step: self.step,
            section_number: self.section_number,
        }
    }

    /// Serializes the state into a store document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn to_document(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(self)
            .map_err(|e| DomainError::Infrastructure(format!("state serialization failed: {e}")))
    }

    /// Deserializes a state from a store document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the document is malformed.
    pub fn from_document(document: serde_json::Value) -> Result<Self, DomainError> {
        serde_json::from_value(document).map_err(|e| {
            DomainError::Infrastructure(format!("state deserialization failed: {e}"))
        })
    }
}

/// A stage's contribution to the session state. Absent fields were not
/// touched by the stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionPartial {
    /// Echoed session identifier.
    pub session_id: Option<String>,
    /// Echoed game identifier.
    pub game_id: Option<String>,
    /// Narrative produced by the content stage.
    pub narrative: Option<Narrative>,
    /// Rules produced by the rules stage.
    pub rules: Option<Rules>,
    /// Player response accepted for the current step.
    pub player_input: Option<String>,
    /// Decision produced by the decision stage.
    pub decision: Option<Decision>,
    /// Character produced by the trace stage.
    pub character: Option<Character>,
    /// Actions to append to the trace.
    pub trace_actions: Vec<ActionRecord>,
    /// Replacement counters.
    pub trace_stats: Option<TraceStats>,
    /// Replacement insights.
    pub insights: Option<String>,
    /// Error raised by the stage.
    pub error: Option<String>,
}

impl SessionPartial {
    /// Whether the partial carries no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
