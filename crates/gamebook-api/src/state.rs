//! Shared application state.

use std::sync::Arc;

use gamebook_content::library::ContentLibrary;
use gamebook_workflow::application::engine::WorkflowEngine;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The workflow engine.
    pub engine: Arc<WorkflowEngine>,
    /// The book the engine plays.
    pub content: Arc<ContentLibrary>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(engine: Arc<WorkflowEngine>, content: Arc<ContentLibrary>) -> Self {
        Self { engine, content }
    }
}
