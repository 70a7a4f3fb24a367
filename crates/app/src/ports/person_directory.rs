//! Person lookup port.

use std::future::Future;

use vigil_domain::call_tree::Person;
use vigil_domain::error::VigilError;
use vigil_domain::id::{PersonId, PlaceId};

/// Read access to the people known to the platform.
pub trait PersonDirectory {
    fn find_by_id(
        &self,
        id: PersonId,
    ) -> impl Future<Output = Result<Option<Person>, VigilError>> + Send;

    fn list_by_place(
        &self,
        place_id: PlaceId,
    ) -> impl Future<Output = Result<Vec<Person>, VigilError>> + Send;
}
