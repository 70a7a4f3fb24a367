//! Incident history of a place.

use axum::Json;
use axum::extract::{Path, State};

use vigil_app::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler,
};
use vigil_domain::incident::AlarmIncident;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/places/{place_id}/incidents`
pub async fn list<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path(place_id): Path<String>,
) -> Result<Json<Vec<AlarmIncident>>, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let incidents = state.coordinator.list_incidents(place_id).await?;
    Ok(Json(incidents))
}
