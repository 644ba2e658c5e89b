//! Concurrent fan-out of the analysis stages.
//!
//! Every relevant stage runs as its own tokio task against the same snapshot,
//! bounded by a per-stage timeout. A failing, panicking or slow stage yields
//! an error report and never aborts its siblings.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::application::stages::{Stage, StageError};
use crate::domain::merge::StageTag;
use crate::domain::state::{Narrative, Rules, SessionPartial, SessionState};

/// Outcome of one stage within a round.
#[derive(Debug)]
pub struct StageReport {
    /// The stage that produced this report.
    pub tag: StageTag,
    /// Its partial, or why it failed.
    pub outcome: Result<SessionPartial, StageError>,
    /// Wall time the stage took.
    pub elapsed: Duration,
}

impl StageReport {
    /// The partial this report contributes to the merge.
    #[must_use]
    pub fn into_partial(self, snapshot: &SessionState, at: DateTime<Utc>) -> SessionPartial {
        match self.outcome {
            Ok(partial) => partial,
            Err(error) => error_partial(self.tag, &error, snapshot, at),
        }
    }
}

/// The partial a failed stage contributes: the error itself and, for stages
/// that own a section-level field, a placeholder carrying that error.
#[must_use]
pub fn error_partial(
    tag: StageTag,
    error: &StageError,
    snapshot: &SessionState,
    at: DateTime<Utc>,
) -> SessionPartial {
    let message = error.to_string();
    let section = snapshot.section_number;
    let mut partial = SessionPartial {
        error: Some(message.clone()),
        ..SessionPartial::default()
    };
    match tag {
        StageTag::Rules => partial.rules = Some(Rules::unavailable(section, message)),
        StageTag::Narrative => {
            partial.narrative = Some(Narrative::unavailable(section, message, at));
        }
        StageTag::Decision | StageTag::Trace => {}
    }
    partial
}

/// Runs stages concurrently with a per-stage timeout.
pub struct StageRunner {
    stages: Vec<Arc<dyn Stage>>,
    stage_timeout: Duration,
}

impl StageRunner {
    /// Creates a runner over `stages`.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Stage>>, stage_timeout: Duration) -> Self {
        Self {
            stages,
            stage_timeout,
        }
    }

    /// Stages relevant to `state`, leaving out `exclude`.
    #[must_use]
    pub fn relevant(&self, state: &SessionState, exclude: &BTreeSet<StageTag>) -> Vec<StageTag> {
        let mut tags: Vec<StageTag> = self
            .stages
            .iter()
            .filter(|s| !exclude.contains(&s.tag()) && s.is_relevant(state))
            .map(|s| s.tag())
            .collect();
        tags.sort();
        tags
    }

    /// Runs every relevant, non-excluded stage against `snapshot` and waits
    /// for all of them. Reports come back in stage order.
    pub async fn run(
        &self,
        snapshot: Arc<SessionState>,
        exclude: &BTreeSet<StageTag>,
    ) -> Vec<StageReport> {
        let mut handles = Vec::new();

        for stage in &self.stages {
            let tag = stage.tag();
            if exclude.contains(&tag) || !stage.is_relevant(&snapshot) {
                debug!(stage = %tag, "stage skipped");
                continue;
            }

            let stage = Arc::clone(stage);
            let snapshot = Arc::clone(&snapshot);
            let bound = self.stage_timeout;
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(bound, stage.run(snapshot)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StageError::Timeout {
                        stage: tag,
                        after: bound,
                    }),
                };
                (outcome, started.elapsed())
            });
            handles.push((tag, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (tag, handle) in handles {
            let (outcome, elapsed) = match handle.await {
                Ok(result) => result,
                Err(join_error) => (
                    Err(StageError::Internal {
                        stage: tag,
                        message: join_error.to_string(),
                    }),
                    Duration::ZERO,
                ),
            };

            match &outcome {
                Ok(_) => debug!(stage = %tag, elapsed_ms = elapsed.as_millis(), "stage completed"),
                Err(e) => warn!(stage = %tag, error = %e, "stage failed"),
            }

            reports.push(StageReport {
                tag,
                outcome,
                elapsed,
            });
        }

        reports.sort_by_key(|r| r.tag);
        reports
    }
}
