//! Default trace recorder.

use std::sync::Arc;

use gamebook_core::clock::Clock;

use crate::application::collaborators::{TracePartial, TraceRecorder};
use crate::application::stages::StageError;
use crate::domain::merge::StageTag;
use crate::domain::state::{ActionRecord, SessionState};

/// Records one action per resolved step and keeps the counters current.
pub struct StepTraceRecorder {
    clock: Arc<dyn Clock>,
}

impl StepTraceRecorder {
    /// Creates a recorder stamping actions with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl TraceRecorder for StepTraceRecorder {
    fn trace_record(&self, state: &SessionState) -> Result<TracePartial, StageError> {
        let decision = state.resolved_decision().ok_or_else(|| StageError::Internal {
            stage: StageTag::Trace,
            message: format!("section {} has no resolved decision", state.section_number),
        })?;
        let next_section = decision.next_section.ok_or_else(|| StageError::Internal {
            stage: StageTag::Trace,
            message: "resolved decision without a target".into(),
        })?;

        let mut stats = state.trace.stats;
        stats.sections_visited += 1;
        if state.dice_result.is_some() {
            stats.dice_rolls += 1;
        }
        if state.player_input.is_some() {
            stats.choices_made += 1;
        }

        let action = ActionRecord {
            id: state.current_action_id(),
            section_number: state.section_number,
            next_section,
            player_input: state.player_input.clone(),
            dice: state.dice_result.clone(),
            summary: decision.summary.clone(),
            recorded_at: self.clock.now(),
        };

        let insights = format!(
            "{} sections visited, {} dice rolls, {} choices made",
            stats.sections_visited, stats.dice_rolls, stats.choices_made
        );

        Ok(TracePartial {
            actions: vec![action],
            stats,
            insights: Some(insights),
        })
    }
}
