//! Alarm incident: the persisted record of one (place, alarm type) alert.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmType, TriggerSource};
use crate::escalation::EscalationStatus;
use crate::id::{IncidentId, PlaceId};
use crate::model::Address;
use crate::state_machine::AlertState;
use crate::time::Timestamp;

/// Serialization key: at most one active incident exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IncidentKey {
    pub place_id: PlaceId,
    pub alarm_type: AlarmType,
}

impl IncidentKey {
    #[must_use]
    pub fn new(place_id: PlaceId, alarm_type: AlarmType) -> Self {
        Self {
            place_id,
            alarm_type,
        }
    }
}

/// A device that contributed to the incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTrigger {
    pub address: Address,
    pub source: TriggerSource,
    pub at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmIncident {
    pub id: IncidentId,
    pub place_id: PlaceId,
    pub alarm_type: AlarmType,
    pub state: AlertState,
    /// Devices currently in a triggered condition.
    pub triggering: BTreeSet<Address>,
    /// Every trigger, oldest first.
    pub triggers: Vec<IncidentTrigger>,
    pub opened_at: Timestamp,
    pub last_transition_at: Timestamp,
    pub closed_at: Option<Timestamp>,
    pub confirmed_by: Option<String>,
    pub cancelled_by: Option<String>,
    #[serde(default)]
    pub escalation: EscalationStatus,
    /// Bumped on every state transition.
    pub generation: u64,
}

impl AlarmIncident {
    /// A fresh incident in INACTIVE, not yet persisted.
    #[must_use]
    pub fn open(key: IncidentKey, now: Timestamp) -> Self {
        Self {
            id: IncidentId::new(),
            place_id: key.place_id,
            alarm_type: key.alarm_type,
            state: AlertState::Inactive,
            triggering: BTreeSet::new(),
            triggers: Vec::new(),
            opened_at: now,
            last_transition_at: now,
            closed_at: None,
            confirmed_by: None,
            cancelled_by: None,
            escalation: EscalationStatus::Idle,
            generation: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> IncidentKey {
        IncidentKey::new(self.place_id, self.alarm_type)
    }

    /// Not yet archived.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.state.is_terminal()
    }

    #[must_use]
    pub fn is_triggering(&self, address: &Address) -> bool {
        self.triggering.contains(address)
    }

    /// Returns `true` when `address` was not already contributing.
    pub fn record_trigger(&mut self, address: Address, source: TriggerSource, now: Timestamp) -> bool {
        if !self.triggering.insert(address.clone()) {
            return false;
        }
        self.triggers.push(IncidentTrigger {
            address,
            source,
            at: now,
        });
        true
    }

    /// Returns `true` when `address` was contributing.
    pub fn record_restore(&mut self, address: &Address) -> bool {
        self.triggering.remove(address)
    }

    /// Move to `state`; terminal states stamp `closed_at`.
    pub fn enter(&mut self, state: AlertState, now: Timestamp) {
        if state == self.state {
            return;
        }
        self.state = state;
        self.last_transition_at = now;
        self.generation += 1;
        if state.is_terminal() {
            self.closed_at = Some(now);
        }
    }
}
