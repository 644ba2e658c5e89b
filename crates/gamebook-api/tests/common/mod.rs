//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use gamebook_content::book::Book;
use gamebook_content::library::ContentLibrary;
use gamebook_core::clock::Clock;
use gamebook_core::repository::SessionRepository;
use gamebook_session_store::in_memory::InMemorySessionRepository;
use gamebook_test_support::{FixedClock, SequenceRng, fixed_now};
use gamebook_workflow::application::collaborators::Collaborators;
use gamebook_workflow::application::engine::{EngineConfig, WorkflowEngine};
use gamebook_workflow::application::trace::StepTraceRecorder;
use http_body_util::BodyExt;
use tower::ServiceExt;

use gamebook_api::state::AppState;

/// The test book: a crossroads (1), a path that leads straight back (48) and
/// a wolf fight (398) won on 8 or more (200) and lost otherwise (13).
pub const BOOK: &str = r"
game_id: forest
title: La Forêt
character:
  resources: { gold: 10 }
  inventory: [Épée]
sections:
  1:
    text: Vous êtes à un **carrefour**.
    choices:
      - { text: Entrer dans la forêt, target: 48 }
      - { text: Continuer ma route, target: 398 }
  48:
    text: Un sentier.
    on_enter: { add_items: [Lanterne] }
    choices:
      - { text: Revenir au carrefour, target: 1 }
  398:
    text: Un loup surgit.
    dice: combat
    choices:
      - { text: Victoire, target: 200, range: { min: 8 } }
      - { text: Défaite, target: 13, range: { max: 7 } }
  200:
    text: Le loup s'enfuit.
    needs_player_input: true
    choices:
      - { text: Recommencer, target: 1 }
  13:
    text: Vous êtes blessé.
    needs_player_input: true
    choices:
      - { text: Recommencer, target: 1 }
";

/// The test book served from memory.
pub fn library() -> Arc<ContentLibrary> {
    Arc::new(ContentLibrary::from_book(Book::from_yaml_str(BOOK).unwrap()).unwrap())
}

/// Writes `contents` to a fresh file under the temp directory.
pub fn book_file(contents: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("gamebook-api-{}-{nanos}.yaml", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Build the full app router over the in-memory store with a fixed clock.
pub fn build_test_app() -> Router {
    build_test_app_with(library(), SequenceRng::new(vec![]))
}

/// Build the full app router with a custom book and `SequenceRng` for tests
/// that need deterministic dice rolls.
pub fn build_test_app_with(content: Arc<ContentLibrary>, rng: SequenceRng) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    let repository: Arc<dyn SessionRepository> = Arc::new(InMemorySessionRepository::new());
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
        Box::new(rng),
        EngineConfig::default(),
    );

    gamebook_api::app(AppState::new(Arc::new(engine), content))
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Start a session on the test book and return its id.
pub async fn start_session(app: &Router) -> String {
    let (status, json) = post_json(app, "/api/v1/sessions", &serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    json["session_id"].as_str().unwrap().to_owned()
}
