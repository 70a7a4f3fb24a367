//! Typed identifier newtypes backed by UUIDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a place (household or site).
    PlaceId
);

define_id!(
    /// Unique identifier for a [`Person`](crate::call_tree::Person).
    PersonId
);

define_id!(
    /// Unique identifier for an [`AlarmIncident`](crate::incident::AlarmIncident).
    IncidentId
);

/// Prefix of the legacy address form of a person reference.
pub const PERSON_ADDRESS_PREFIX: &str = "SERV:person:";

impl PersonId {
    /// Parse a person reference given either as a bare UUID or as a
    /// `SERV:person:<uuid>` address.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPersonReference`] when the text is
    /// neither form.
    pub fn from_reference(reference: &str) -> Result<Self, ValidationError> {
        let raw = reference
            .strip_prefix(PERSON_ADDRESS_PREFIX)
            .unwrap_or(reference);
        Self::from_str(raw)
            .map_err(|_| ValidationError::InvalidPersonReference(reference.to_string()))
    }

    /// Address form (`SERV:person:<uuid>`).
    #[must_use]
    pub fn address(self) -> String {
        format!("{PERSON_ADDRESS_PREFIX}{}", self.0)
    }
}
