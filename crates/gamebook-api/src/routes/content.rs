//! Routes for the served book.

use std::sync::Arc;

use axum::extract::State;
use axum::{Json, Router, routing::post};
use gamebook_core::error::DomainError;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for POST /reload.
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    /// Book that was reloaded.
    pub game_id: String,
    /// Sections whose content changed.
    pub changed_sections: Vec<u32>,
    /// Cache entries dropped for them.
    pub invalidated: usize,
}

/// POST /reload
///
/// Re-reads the book file and drops cached rules and narrative of every
/// section whose content hash changed.
#[instrument(skip(state))]
async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let content = Arc::clone(&state.content);
    let report = tokio::task::spawn_blocking(move || content.reload())
        .await
        .map_err(|e| DomainError::Infrastructure(format!("reload task failed: {e}")))??;

    let invalidated = state
        .engine
        .invalidate_sections(&report.game_id, &report.changed_sections);
    info!(game_id = %report.game_id, changed = report.changed_sections.len(), invalidated, "content reloaded");

    Ok(Json(ReloadResponse {
        game_id: report.game_id,
        changed_sections: report.changed_sections,
        invalidated,
    }))
}

/// Returns the router for content management.
pub fn router() -> Router<AppState> {
    Router::new().route("/reload", post(reload))
}
