//! Shared test mocks and utilities for the gamebook workflow engine.

mod clock;
mod repository;
mod rng;

pub use clock::{FixedClock, fixed_now};
pub use repository::{ConflictingSessionRepository, FailingSessionRepository};
pub use rng::{MockRng, SequenceRng};
