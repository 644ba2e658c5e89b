//! Domain layer: the session state model and the pure rules that act on it.

pub mod choice;
pub mod commands;
pub mod dice;
pub mod merge;
pub mod state;
pub mod transition;
