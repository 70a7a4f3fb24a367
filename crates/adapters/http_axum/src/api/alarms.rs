//! Commands and queries on the active incident of one alarm type.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use vigil_app::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler,
};
use vigil_domain::error::{NotFoundError, VigilError};
use vigil_domain::escalation::{DeliveryHandle, DeliveryOutcome};
use vigil_domain::id::PersonId;
use vigil_domain::incident::AlarmIncident;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for confirm and cancel.
#[derive(Deserialize)]
pub struct ActorRequest {
    /// Who issued the command (person address, keypad, rule...).
    pub actor: String,
}

/// Request body for an acknowledgement.
#[derive(Deserialize)]
pub struct AcknowledgeRequest {
    /// Bare UUID or `SERV:person:<uuid>`.
    pub person: String,
}

/// Possible responses from the delivery outcome endpoint.
pub enum DeliveryResponse {
    Accepted,
}

impl IntoResponse for DeliveryResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// `GET /api/places/{place_id}/alarms/{alarm}`
pub async fn get<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path((place_id, alarm)): Path<(String, String)>,
) -> Result<Json<AlarmIncident>, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let alarm_type = super::parse_alarm(&alarm)?;
    let incident = state
        .coordinator
        .active_incident(place_id, alarm_type)
        .await?
        .ok_or_else(|| {
            VigilError::from(NotFoundError {
                entity: "AlarmIncident",
                id: format!("{place_id}/{alarm_type}"),
            })
        })?;
    Ok(Json(incident))
}

/// `POST /api/places/{place_id}/alarms/{alarm}/confirm`
pub async fn confirm<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path((place_id, alarm)): Path<(String, String)>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<AlarmIncident>, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let alarm_type = super::parse_alarm(&alarm)?;
    let incident = state
        .coordinator
        .confirm(place_id, alarm_type, &req.actor)
        .await?;
    Ok(Json(incident))
}

/// `POST /api/places/{place_id}/alarms/{alarm}/cancel`
pub async fn cancel<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path((place_id, alarm)): Path<(String, String)>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<AlarmIncident>, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let alarm_type = super::parse_alarm(&alarm)?;
    let incident = state
        .coordinator
        .cancel(place_id, alarm_type, &req.actor)
        .await?;
    Ok(Json(incident))
}

/// `POST /api/places/{place_id}/alarms/{alarm}/acknowledge`
pub async fn acknowledge<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path((place_id, alarm)): Path<(String, String)>,
    Json(req): Json<AcknowledgeRequest>,
) -> Result<Json<AlarmIncident>, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let alarm_type = super::parse_alarm(&alarm)?;
    let person = PersonId::from_reference(&req.person)?;
    let incident = state
        .coordinator
        .acknowledge(place_id, alarm_type, person)
        .await?;
    Ok(Json(incident))
}

/// `POST /api/places/{place_id}/alarms/{alarm}/deliveries/{handle}`
pub async fn report_delivery<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path((place_id, alarm, handle)): Path<(String, String, String)>,
    Json(outcome): Json<DeliveryOutcome>,
) -> Result<DeliveryResponse, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let alarm_type = super::parse_alarm(&alarm)?;
    state
        .coordinator
        .report_delivery(place_id, alarm_type, &DeliveryHandle::new(handle), outcome)
        .await?;
    Ok(DeliveryResponse::Accepted)
}
