//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod alarms;
#[allow(clippy::missing_errors_doc)]
pub mod call_trees;
#[allow(clippy::missing_errors_doc)]
pub mod changes;
#[allow(clippy::missing_errors_doc)]
pub mod incidents;

use std::str::FromStr;

use axum::Router;
use axum::routing::{get, post};

use vigil_app::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler,
};
use vigil_domain::alarm::AlarmType;
use vigil_domain::error::ValidationError;
use vigil_domain::id::PlaceId;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<I, C, P, N, S, K>() -> Router<AppState<I, C, P, N, S, K>>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    Router::new()
        // Device changes
        .route(
            "/places/{place_id}/changes",
            post(changes::submit::<I, C, P, N, S, K>),
        )
        // Incidents
        .route(
            "/places/{place_id}/incidents",
            get(incidents::list::<I, C, P, N, S, K>),
        )
        .route(
            "/places/{place_id}/alarms/{alarm}",
            get(alarms::get::<I, C, P, N, S, K>),
        )
        .route(
            "/places/{place_id}/alarms/{alarm}/confirm",
            post(alarms::confirm::<I, C, P, N, S, K>),
        )
        .route(
            "/places/{place_id}/alarms/{alarm}/cancel",
            post(alarms::cancel::<I, C, P, N, S, K>),
        )
        .route(
            "/places/{place_id}/alarms/{alarm}/acknowledge",
            post(alarms::acknowledge::<I, C, P, N, S, K>),
        )
        .route(
            "/places/{place_id}/alarms/{alarm}/deliveries/{handle}",
            post(alarms::report_delivery::<I, C, P, N, S, K>),
        )
        // Call trees
        .route(
            "/places/{place_id}/call-trees/{namespace}",
            get(call_trees::get::<I, C, P, N, S, K>).put(call_trees::replace::<I, C, P, N, S, K>),
        )
}

fn parse_place(raw: &str) -> Result<PlaceId, ApiError> {
    PlaceId::from_str(raw).map_err(|_| ValidationError::InvalidId(raw.to_string()).into())
}

fn parse_alarm(raw: &str) -> Result<AlarmType, ApiError> {
    Ok(AlarmType::from_str(raw)?)
}
