//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use vigil_app::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler,
};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// API routes live under `/api`. A [`TraceLayer`] logs each request and
/// response through `tracing`.
pub fn build<I, C, P, N, S, K>(state: AppState<I, C, P, N, S, K>) -> Router
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
