//! Incident repository port: persistence for alarm incidents.

use std::future::Future;

use vigil_domain::error::VigilError;
use vigil_domain::id::PlaceId;
use vigil_domain::incident::{AlarmIncident, IncidentKey};

/// Repository for persisting and querying [`AlarmIncident`]s.
///
/// Archived (terminal) incidents stay listable.
pub trait IncidentRepository {
    /// The open incident for `key`, if any.
    fn find_active(
        &self,
        key: IncidentKey,
    ) -> impl Future<Output = Result<Option<AlarmIncident>, VigilError>> + Send;

    /// Insert or replace an incident by id.
    fn save(
        &self,
        incident: AlarmIncident,
    ) -> impl Future<Output = Result<AlarmIncident, VigilError>> + Send;

    /// Every incident of a place, newest first.
    fn list_by_place(
        &self,
        place_id: PlaceId,
    ) -> impl Future<Output = Result<Vec<AlarmIncident>, VigilError>> + Send;
}
