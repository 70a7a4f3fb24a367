//! Call tree repository port.

use std::future::Future;

use vigil_domain::call_tree::CallTree;
use vigil_domain::error::VigilError;
use vigil_domain::id::PlaceId;

/// Call trees keyed by (place, namespace).
pub trait CallTreeRepository {
    /// Load a call tree; an unknown key yields an empty tree.
    fn load(
        &self,
        place_id: PlaceId,
        namespace: &str,
    ) -> impl Future<Output = Result<CallTree, VigilError>> + Send;

    /// Replace the call tree stored under the key.
    fn save(
        &self,
        place_id: PlaceId,
        namespace: &str,
        tree: CallTree,
    ) -> impl Future<Output = Result<CallTree, VigilError>> + Send;
}
