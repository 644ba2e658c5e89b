//! Gamebook API: HTTP transport for the workflow engine.

use axum::Router;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

/// The application router without transport layers.
#[must_use]
pub fn app(state: state::AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/sessions", routes::session::router())
        .nest("/api/v1/content", routes::content::router())
        .with_state(state)
}
