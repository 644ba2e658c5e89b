//! Application layer: collaborator ports, the concurrent stage runner and the
//! engine that drives one workflow step end to end.

pub mod cache;
pub mod collaborators;
pub mod engine;
pub mod locks;
pub mod runner;
pub mod stages;
pub mod trace;
