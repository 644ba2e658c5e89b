//! Gamebook Workflow: the narrative workflow engine.
//!
//! Responsible for fanning a section out to its analysis stages (rules,
//! narrative, decision, trace), merging their partial results under a
//! per-field reducer table, and driving the section-transition state machine
//! that consumes dice results and player input.

pub mod application;
pub mod domain;
