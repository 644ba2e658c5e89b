//! Merge policy: how concurrent partial updates fold into the session state.
//!
//! Every mergeable field has exactly one reducer in [`REDUCERS`]. Partials are
//! folded in stage declaration order, so the merged state does not depend on
//! the order in which stages finished.

use std::collections::HashSet;
use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};

use super::state::{
    ActionRecord, Character, Decision, Narrative, Rules, SessionPartial, SessionState, TraceStats,
};

/// The four analysis stages, in fan-out order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
    /// Rules retrieval.
    Rules,
    /// Narrative content.
    Narrative,
    /// Choice resolution.
    Decision,
    /// History and character bookkeeping.
    Trace,
}

impl StageTag {
    /// All stages in fan-out order.
    pub const ALL: [Self; 4] = [Self::Rules, Self::Narrative, Self::Decision, Self::Trace];

    /// Stable name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Narrative => "narrative",
            Self::Decision => "decision",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emptiness as seen by the reducers.
pub trait FieldValue {
    /// The value is absent.
    fn is_null(&self) -> bool;

    /// The value is absent or carries nothing worth keeping.
    fn is_blank(&self) -> bool {
        self.is_null()
    }
}

impl FieldValue for String {
    fn is_null(&self) -> bool {
        self.is_empty()
    }

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn is_null(&self) -> bool {
        self.is_none()
    }

    fn is_blank(&self) -> bool {
        self.as_ref().is_none_or(|value| value.is_blank())
    }
}

impl<T> FieldValue for Vec<T> {
    fn is_null(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! always_present {
    ($($ty:ty),* $(,)?) => {
        $(impl FieldValue for $ty {
            fn is_null(&self) -> bool {
                false
            }
        })*
    };
}

always_present!(Narrative, Rules, Decision, Character, TraceStats);

/// Returns `incoming` unless it is blank.
pub fn keep_if_not_empty<T: FieldValue>(current: T, incoming: T) -> T {
    if incoming.is_blank() {
        current
    } else {
        incoming
    }
}

/// Returns `current` unless it is null.
pub fn first_not_none<T: FieldValue>(current: T, incoming: T) -> T {
    if current.is_null() {
        incoming
    } else {
        current
    }
}

/// Always returns `incoming`.
pub fn take_last_value<T>(_current: T, incoming: T) -> T {
    incoming
}

/// Returns `incoming` only when it was produced by the field's owner.
pub fn take_from_node<T>(current: T, incoming: T, producer: StageTag, owner: StageTag) -> T {
    if producer == owner {
        incoming
    } else {
        current
    }
}

/// Appends `incoming` entries whose identity is not present yet. Existing
/// entries are never reordered or removed.
pub fn append_dedupe(
    mut current: Vec<ActionRecord>,
    incoming: Vec<ActionRecord>,
) -> Vec<ActionRecord> {
    let mut seen: HashSet<_> = current.iter().map(|a| a.id).collect();
    for action in incoming {
        if seen.insert(action.id) {
            current.push(action);
        }
    }
    current
}

/// A reducer as stored in the table: `(current, incoming, producer) -> merged`.
pub type Reducer<T> = fn(T, T, StageTag) -> T;

/// One reducer per mergeable field of [`SessionState`].
#[derive(Clone, Copy)]
pub struct ReducerTable {
    /// `session_id`.
    pub session_id: Reducer<String>,
    /// `game_id`.
    pub game_id: Reducer<String>,
    /// `narrative`.
    pub narrative: Reducer<Option<Narrative>>,
    /// `rules`.
    pub rules: Reducer<Option<Rules>>,
    /// `player_input`.
    pub player_input: Reducer<Option<String>>,
    /// `decision`.
    pub decision: Reducer<Option<Decision>>,
    /// `character`.
    pub character: Reducer<Character>,
    /// `trace.actions`.
    pub trace_actions: Reducer<Vec<ActionRecord>>,
    /// `trace.stats`.
    pub trace_stats: Reducer<TraceStats>,
    /// `trace.insights`.
    pub insights: Reducer<Option<String>>,
    /// `error`.
    pub error: Reducer<Option<String>>,
}

/// The session state's reducer table.
pub const REDUCERS: ReducerTable = ReducerTable {
    session_id: |current, incoming, _| keep_if_not_empty(current, incoming),
    game_id: |current, incoming, _| keep_if_not_empty(current, incoming),
    narrative: |current, incoming, _| take_last_value(current, incoming),
    rules: |current, incoming, producer| {
        take_from_node(current, incoming, producer, StageTag::Rules)
    },
    player_input: |current, incoming, _| keep_if_not_empty(current, incoming),
    decision: |current, incoming, _| take_last_value(current, incoming),
    character: |current, incoming, _| take_last_value(current, incoming),
    trace_actions: |current, incoming, _| append_dedupe(current, incoming),
    trace_stats: |current, incoming, producer| {
        take_from_node(current, incoming, producer, StageTag::Trace)
    },
    insights: |current, incoming, producer| {
        take_from_node(current, incoming, producer, StageTag::Trace)
    },
    error: |current, incoming, _| first_not_none(current, incoming),
};

/// Folds one partial into `state` through the reducer table.
pub fn merge_partial(state: &mut SessionState, producer: StageTag, partial: SessionPartial) {
    let table = &REDUCERS;

    if let Some(session_id) = partial.session_id {
        state.session_id = (table.session_id)(mem::take(&mut state.session_id), session_id, producer);
    }
    if let Some(game_id) = partial.game_id {
        state.game_id = (table.game_id)(mem::take(&mut state.game_id), game_id, producer);
    }
    if let Some(narrative) = partial.narrative {
        state.narrative = (table.narrative)(state.narrative.take(), Some(narrative), producer);
    }
    if let Some(rules) = partial.rules {
        state.rules = (table.rules)(state.rules.take(), Some(rules), producer);
    }
    if let Some(input) = partial.player_input {
        state.player_input = (table.player_input)(state.player_input.take(), Some(input), producer);
    }
    if let Some(decision) = partial.decision {
        state.decision = (table.decision)(state.decision.take(), Some(decision), producer);
    }
    if let Some(character) = partial.character {
        state.character = (table.character)(mem::take(&mut state.character), character, producer);
    }
    if !partial.trace_actions.is_empty() {
        state.trace.actions = (table.trace_actions)(
            mem::take(&mut state.trace.actions),
            partial.trace_actions,
            producer,
        );
    }
    if let Some(stats) = partial.trace_stats {
        state.trace.stats = (table.trace_stats)(state.trace.stats, stats, producer);
    }
    if let Some(insights) = partial.insights {
        state.trace.insights = (table.insights)(state.trace.insights.take(), Some(insights), producer);
    }
    if let Some(error) = partial.error {
        state.error = (table.error)(state.error.take(), Some(error), producer);
    }
}

/// Folds every contribution into `state` in stage declaration order,
/// whatever order they arrived in.
pub fn merge_all(state: &mut SessionState, mut contributions: Vec<(StageTag, SessionPartial)>) {
    contributions.sort_by_key(|(tag, _)| *tag);
    for (tag, partial) in contributions {
        merge_partial(state, tag, partial);
    }
}
