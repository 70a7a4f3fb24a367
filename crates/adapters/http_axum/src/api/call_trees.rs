//! Call tree maintenance.

use axum::Json;
use axum::extract::{Path, State};

use vigil_app::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler,
};
use vigil_domain::call_tree::{CallTree, CallTreeEntry};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/places/{place_id}/call-trees/{namespace}`
///
/// An unknown namespace yields an empty tree.
pub async fn get<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path((place_id, namespace)): Path<(String, String)>,
) -> Result<Json<CallTree>, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let tree = state
        .coordinator
        .call_trees()
        .get_call_tree(place_id, &namespace)
        .await?;
    Ok(Json(tree))
}

/// `PUT /api/places/{place_id}/call-trees/{namespace}`
pub async fn replace<I, C, P, N, S, K>(
    State(state): State<AppState<I, C, P, N, S, K>>,
    Path((place_id, namespace)): Path<(String, String)>,
    Json(entries): Json<Vec<CallTreeEntry>>,
) -> Result<Json<CallTree>, ApiError>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    let place_id = super::parse_place(&place_id)?;
    let tree = CallTree::new(entries)?;
    let tree = state
        .coordinator
        .call_trees()
        .replace_call_tree(place_id, &namespace, tree)
        .await?;
    Ok(Json(tree))
}
