//! Inputs fed to the incident coordinator.

use serde::{Deserialize, Serialize};

use crate::id::PlaceId;
use crate::model::{Address, Model, ModelSnapshot};

/// A device reported new attribute values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceChange {
    pub place_id: PlaceId,
    pub address: Address,
    /// Names of the attributes that changed.
    #[serde(default)]
    pub changed: Vec<String>,
    /// Every model of the place, already updated with the change.
    pub snapshot: ModelSnapshot,
}

impl DeviceChange {
    #[must_use]
    pub fn new(address: impl Into<Address>, snapshot: ModelSnapshot) -> Self {
        Self {
            place_id: snapshot.place_id(),
            address: address.into(),
            changed: Vec::new(),
            snapshot,
        }
    }

    #[must_use]
    pub fn with_changed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed = names.into_iter().map(Into::into).collect();
        self
    }

    /// The changed model, `None` when the snapshot does not hold it.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        self.snapshot.get(&self.address)
    }
}
