//! Routes for game sessions.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use gamebook_workflow::application::engine::StepOutcome;
use gamebook_workflow::domain::commands::{AdvanceSession, ResetSession, RollDice, StartSession};
use gamebook_workflow::domain::dice::{DiceKind, DiceOutcome};
use gamebook_workflow::domain::state::SessionState;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Book to play; defaults to the loaded book.
    #[serde(default)]
    pub game_id: Option<String>,
}

/// Request body for POST /{session_id}/advance.
#[derive(Debug, Default, Deserialize)]
pub struct AdvanceRequest {
    /// Free-form player response.
    #[serde(default)]
    pub player_input: Option<String>,
    /// Die kind the engine should roll, `chance` or `combat`.
    #[serde(default)]
    pub dice_kind: Option<String>,
    /// A roll made by the client.
    #[serde(default)]
    pub dice_result: Option<DiceOutcome>,
}

/// Request body for POST /{session_id}/roll-dice.
#[derive(Debug, Deserialize)]
pub struct RollDiceRequest {
    /// Die kind to roll, `chance` or `combat`.
    pub dice_kind: String,
}

fn parse_kind(kind: &str) -> Result<DiceKind, ApiError> {
    Ok(kind.parse::<DiceKind>()?)
}

/// POST /
#[instrument(skip(state, request))]
async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Json<SessionState>, ApiError> {
    let command = StartSession {
        correlation_id: Uuid::new_v4(),
        game_id: request
            .game_id
            .unwrap_or_else(|| state.content.game_id()),
    };

    info!(correlation_id = %command.correlation_id, game_id = %command.game_id, "handling start_session command");

    let session = state.engine.handle_start_session(&command).await?;
    Ok(Json(session))
}

/// GET /{session_id}
#[instrument(skip(state))]
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionState>, ApiError> {
    let session = state.engine.current_state(&session_id).await?;
    Ok(Json(session))
}

/// POST /{session_id}/advance
#[instrument(skip(state, request))]
async fn advance(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AdvanceRequest>,
) -> Result<Json<StepOutcome>, ApiError> {
    let command = AdvanceSession {
        correlation_id: Uuid::new_v4(),
        session_id,
        player_input: request.player_input,
        dice_kind: request.dice_kind.as_deref().map(parse_kind).transpose()?,
        dice_result: request.dice_result,
    };

    info!(correlation_id = %command.correlation_id, "handling advance_session command");

    let outcome = state.engine.handle_advance(&command).await?;
    Ok(Json(outcome))
}

/// POST /{session_id}/roll-dice
#[instrument(skip(state, request))]
async fn roll_dice(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<RollDiceRequest>,
) -> Result<Json<DiceOutcome>, ApiError> {
    let command = RollDice {
        correlation_id: Uuid::new_v4(),
        session_id,
        dice_kind: parse_kind(&request.dice_kind)?,
    };

    info!(correlation_id = %command.correlation_id, kind = %command.dice_kind, "handling roll_dice command");

    let outcome = state.engine.handle_roll_dice(&command).await?;
    Ok(Json(outcome))
}

/// POST /{session_id}/reset
#[instrument(skip(state))]
async fn reset(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionState>, ApiError> {
    let command = ResetSession {
        correlation_id: Uuid::new_v4(),
        session_id,
    };

    info!(correlation_id = %command.correlation_id, "handling reset_session command");

    let session = state.engine.handle_reset_session(&command).await?;
    Ok(Json(session))
}

/// Returns the router for sessions.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_session))
        .route("/{session_id}", get(get_session))
        .route("/{session_id}/advance", post(advance))
        .route("/{session_id}/roll-dice", post(roll_dice))
        .route("/{session_id}/reset", post(reset))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gamebook_content::book::Book;
    use gamebook_content::library::ContentLibrary;
    use gamebook_core::clock::Clock;
    use gamebook_core::repository::SessionRepository;
    use gamebook_test_support::{FailingSessionRepository, FixedClock, MockRng, fixed_now};
    use gamebook_workflow::application::collaborators::Collaborators;
    use gamebook_workflow::application::engine::{EngineConfig, WorkflowEngine};
    use gamebook_workflow::application::trace::StepTraceRecorder;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOOK: &str = "game_id: g\nsections:\n  1:\n    text: Début.\n";

    fn app_state_with(repository: Arc<dyn SessionRepository>) -> AppState {
        let content = Arc::new(ContentLibrary::from_book(Book::from_yaml_str(BOOK).unwrap()).unwrap());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
        let collaborators = Collaborators {
            rules: Arc::clone(&content) as _,
            content: Arc::clone(&content) as _,
            trace: Arc::new(StepTraceRecorder::new(Arc::clone(&clock))),
            character: Arc::clone(&content) as _,
        };
        let engine = WorkflowEngine::new(
            collaborators,
            repository,
            clock,
            Box::new(MockRng),
            EngineConfig::default(),
        );
        AppState::new(Arc::new(engine), content)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[test]
    fn test_parse_kind_accepts_names_and_notation() {
        assert_eq!(parse_kind("combat").unwrap(), DiceKind::Combat);
        assert_eq!(parse_kind("1d6").unwrap(), DiceKind::Chance);
        assert!(parse_kind("d20").is_err());
    }

    #[tokio::test]
    async fn test_start_session_returns_500_when_store_fails() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(FailingSessionRepository)));

        // Act
        let response = app.oneshot(post("/", "{}")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(json["error"], "infrastructure_error");
    }

    #[tokio::test]
    async fn test_roll_dice_returns_422_for_missing_dice_kind() {
        let app = router().with_state(app_state_with(Arc::new(FailingSessionRepository)));

        let response = app.oneshot(post("/s-1/roll-dice", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
