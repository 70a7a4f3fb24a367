//! Alert lifecycle shared by every alarm type.
//!
//! ```text
//! INACTIVE ──▶ PREALERT ──▶ ALERT ──▶ CLEARING ──▶ CLEARED
//!                  │           │
//!                  └───────────┴──▶ CANCELLED
//! ```
//!
//! [`AlertState::on_trigger_event`] is a pure table lookup; unhandled events
//! leave the state unchanged. Effects (timers, escalation, archiving) are
//! only requested from the `on_enter` / `on_exit` hooks through a
//! [`StateContext`], which the application layer implements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::alarm::AlarmType;

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertState {
    Inactive,
    PreAlert,
    Alert,
    Clearing,
    Cleared,
    Cancelled,
}

/// Semantic input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerEvent {
    SensorTriggered,
    /// One contributing device restored while others are still triggered.
    SensorRestored,
    /// The last contributing device restored.
    AllSensorsRestored,
    ConfirmedByPerson,
    DwellElapsed,
    Cancelled,
}

/// Effects the state hooks may request.
pub trait StateContext {
    fn alarm_type(&self) -> AlarmType;
    fn arm_dwell_timer(&mut self);
    fn cancel_dwell_timer(&mut self);
    /// Cancel every outstanding task (dwell, retries, deadlines).
    fn cancel_pending_tasks(&mut self);
    fn start_escalation(&mut self);
    fn stop_escalation(&mut self);
    fn archive(&mut self);
}

impl AlertState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::PreAlert => "PREALERT",
            Self::Alert => "ALERT",
            Self::Clearing => "CLEARING",
            Self::Cleared => "CLEARED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cleared | Self::Cancelled)
    }

    /// PREALERT, ALERT or CLEARING.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::PreAlert | Self::Alert | Self::Clearing)
    }

    /// Next state for `event`; the current state when the event is not handled.
    #[must_use]
    pub fn on_trigger_event(self, event: TriggerEvent) -> Self {
        match (self, event) {
            (Self::Inactive, TriggerEvent::SensorTriggered) => Self::PreAlert,
            (Self::PreAlert, TriggerEvent::ConfirmedByPerson | TriggerEvent::DwellElapsed) => {
                Self::Alert
            }
            (Self::PreAlert | Self::Alert, TriggerEvent::AllSensorsRestored) => Self::Clearing,
            (Self::PreAlert | Self::Alert, TriggerEvent::Cancelled) => Self::Cancelled,
            (state, _) => state,
        }
    }

    /// Entry hook. Returns a state to chain into immediately.
    pub fn on_enter<C: StateContext>(self, ctx: &mut C) -> Option<Self> {
        match self {
            Self::Inactive => None,
            Self::PreAlert => {
                if ctx.alarm_type().auto_confirm() {
                    Some(Self::Alert)
                } else {
                    ctx.arm_dwell_timer();
                    None
                }
            }
            Self::Alert => {
                ctx.start_escalation();
                None
            }
            Self::Clearing => {
                ctx.cancel_pending_tasks();
                ctx.stop_escalation();
                Some(Self::Cleared)
            }
            Self::Cleared => {
                ctx.archive();
                None
            }
            Self::Cancelled => {
                ctx.cancel_pending_tasks();
                ctx.stop_escalation();
                ctx.archive();
                None
            }
        }
    }

    pub fn on_exit<C: StateContext>(self, ctx: &mut C) {
        if self == Self::PreAlert {
            ctx.cancel_dwell_timer();
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Inactive,
            Self::PreAlert,
            Self::Alert,
            Self::Clearing,
            Self::Cleared,
            Self::Cancelled,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown alert state {s:?}"))
    }
}

/// Outcome of [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: AlertState,
    pub to: AlertState,
    /// Every state entered, in order, including chained ones.
    pub path: Vec<AlertState>,
}

impl Transition {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Run `event` against `current`, following `on_enter` chaining until the
/// state settles. Never fails.
pub fn apply<C: StateContext>(ctx: &mut C, current: AlertState, event: TriggerEvent) -> Transition {
    let mut path = Vec::new();
    let mut state = current;
    let mut target = current.on_trigger_event(event);

    while target != state {
        state.on_exit(ctx);
        path.push(target);
        state = target;
        match state.on_enter(ctx) {
            Some(next) => target = next,
            None => break,
        }
    }

    Transition {
        from: current,
        to: state,
        path,
    }
}
