//! Gamebook API server entry point.

use std::sync::Arc;

use gamebook_api::config::AppConfig;
use gamebook_api::error::AppError;
use gamebook_api::state::AppState;
use gamebook_content::library::ContentLibrary;
use gamebook_core::clock::{Clock, SystemClock};
use gamebook_core::repository::SessionRepository;
use gamebook_core::rng::{DeterministicRng, SeededRng};
use gamebook_session_store::in_memory::InMemorySessionRepository;
use gamebook_session_store::pg_session_repository::PgSessionRepository;
use gamebook_session_store::schema::CREATE_SESSION_STATES_TABLE;
use gamebook_workflow::application::collaborators::Collaborators;
use gamebook_workflow::application::engine::WorkflowEngine;
use gamebook_workflow::application::trace::StepTraceRecorder;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting gamebook API server");

    let config = AppConfig::from_env()?;

    let content = Arc::new(ContentLibrary::load(&config.book_path)?);

    let repository: Arc<dyn SessionRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            sqlx::raw_sql(CREATE_SESSION_STATES_TABLE)
                .execute(&pool)
                .await?;
            tracing::info!("Sessions stored in PostgreSQL");
            Arc::new(PgSessionRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, sessions are kept in memory");
            Arc::new(InMemorySessionRepository::new())
        }
    };

    let rng: Box<dyn DeterministicRng> = match config.rng_seed {
        Some(seed) => Box::new(SeededRng::from_seed(seed)),
        None => Box::new(SeededRng::from_entropy()),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

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
        rng,
        config.engine_config(),
    );
    let app_state = AppState::new(Arc::new(engine), content);

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = gamebook_api::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
