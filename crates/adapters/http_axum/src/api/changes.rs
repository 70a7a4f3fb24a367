//! Device change ingress.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use vigil_app::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler,
};
use vigil_domain::event::DeviceChange;
use vigil_domain::incident::AlarmIncident;
use vigil_domain::model::{Address, Model, ModelSnapshot};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for a device change.
#[derive(Deserialize)]
pub struct DeviceChangeRequest {
    /// Model that changed.
    pub address: Address,
    #[serde(default)]
    pub changed: Vec<String>,
    /// Every model of the place, with the change applied.
    pub models: Vec<Model>,
}

/// `POST /api/places/{place_id}/changes`
///
/// Responds with the incidents the change affected.
pub async fn submit<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path(place_id): Path<String>,
    Json(req): Json<DeviceChangeRequest>,
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
    let snapshot = ModelSnapshot::new(place_id, req.models);
    let change = DeviceChange::new(req.address, snapshot).with_changed(req.changed);
    let incidents = state.coordinator.on_device_change(&change).await?;
    Ok(Json(incidents))
}
