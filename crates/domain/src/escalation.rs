//! Escalation: walking the call tree with retry, backoff and expiry.
//!
//! [`Escalation`] is pure bookkeeping: it decides *what* should happen next
//! ([`EscalationStep`]) and never performs IO. Every step bumps the
//! escalation epoch; timers scheduled for a step carry that epoch and are
//! ignored once it is stale.
//!
//! The retry delay after the k-th failed dispatch to a recipient is
//! [`seconds_before_retry`]`(k - 1)`: 0s, 1s, 2s, 4s, … capped at the
//! configured maximum.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alarm::AlarmType;
use crate::id::{IncidentId, PersonId, PlaceId};
use crate::state_machine::AlertState;
use crate::time::{self, Timestamp};

/// Default cap on the delay between two dispatches.
pub const DEFAULT_MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);
/// Default number of dispatches per recipient.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default time a recipient has to acknowledge before escalation moves on.
pub const DEFAULT_ATTEMPT_TTL: Duration = Duration::from_secs(300);

/// `min(max_backoff_secs, ceil((2^attempt_count - 1) / 2))`, saturating.
#[must_use]
pub fn seconds_before_retry(attempt_count: u32, max_backoff_secs: u64) -> u64 {
    let power = 1_u64.checked_shl(attempt_count).unwrap_or(u64::MAX);
    (power - 1).div_ceil(2).min(max_backoff_secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_backoff: Duration,
    pub max_retries: u32,
    pub attempt_ttl: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_backoff: DEFAULT_MAX_BACKOFF_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            attempt_ttl: DEFAULT_ATTEMPT_TTL,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn retry_delay(&self, attempt_count: u32) -> Duration {
        Duration::from_secs(seconds_before_retry(
            attempt_count,
            self.max_backoff.as_secs(),
        ))
    }
}

/// How the call tree is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPolicy {
    /// One recipient at a time, in call-tree order, with retries.
    #[default]
    Sequential,
    /// Every recipient at once, one attempt each.
    Parallel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    #[default]
    Push,
    Sms,
    Ivr,
    Email,
}

impl NotificationMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Ivr => "ivr",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for NotificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Payload handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub incident_id: IncidentId,
    pub place_id: PlaceId,
    pub alarm_type: AlarmType,
    pub state: AlertState,
    pub priority: Priority,
    pub attempt: u32,
}

/// Opaque id the notifier returns for an accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryHandle(String);

impl DeliveryHandle {
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asynchronous result of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Acknowledged { by: PersonId },
    Failed { reason: String },
}

/// One recipient's notification attempt series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub incident_id: IncidentId,
    pub recipient: PersonId,
    pub method: NotificationMethod,
    pub attempt_count: u32,
    pub expiration_time: Timestamp,
    pub last_attempt_at: Option<Timestamp>,
}

impl NotificationAttempt {
    #[must_use]
    pub fn new(
        incident_id: IncidentId,
        recipient: PersonId,
        method: NotificationMethod,
        now: Timestamp,
        ttl: Duration,
    ) -> Self {
        Self {
            incident_id,
            recipient,
            method,
            attempt_count: 0,
            expiration_time: time::add(now, ttl),
            last_attempt_at: None,
        }
    }

    /// Either condition is terminal on its own.
    #[must_use]
    pub fn has_expired(&self, now: Timestamp, max_retries: u32) -> bool {
        self.expiry(now, max_retries).is_some()
    }

    #[must_use]
    pub fn expiry(&self, now: Timestamp, max_retries: u32) -> Option<ExpiryReason> {
        if now >= self.expiration_time {
            Some(ExpiryReason::TimedOut)
        } else if self.attempt_count >= max_retries {
            Some(ExpiryReason::RetriesExhausted)
        } else {
            None
        }
    }

    pub fn record_dispatch(&mut self, now: Timestamp) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_attempt_at = Some(now);
    }

    /// Delay before the next dispatch after the latest one failed.
    #[must_use]
    pub fn retry_delay(&self, backoff: &BackoffPolicy) -> Duration {
        backoff.retry_delay(self.attempt_count.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    TimedOut,
    RetriesExhausted,
    CallTreeExhausted,
}

/// Report emitted when an attempt or the whole call tree is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredEscalation {
    pub incident_id: IncidentId,
    /// `None` when the whole call tree is exhausted.
    pub recipient: Option<PersonId>,
    pub attempts: u32,
    pub reason: ExpiryReason,
}

/// Escalation progress, persisted with the incident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EscalationStatus {
    #[default]
    Idle,
    Notifying {
        recipient: PersonId,
    },
    Acknowledged {
        by: PersonId,
        at: Timestamp,
    },
    /// Every recipient expired; the incident stays in ALERT.
    Exhausted {
        at: Timestamp,
    },
    Stopped,
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationStep {
    /// Send these attempts now; their dispatch has already been counted.
    Dispatch(Vec<NotificationAttempt>),
    RetryAfter(Duration),
    AwaitAcknowledgement(Duration),
    Exhausted,
    Idle,
}

/// Call-tree walk for one incident.
#[derive(Debug, Clone)]
pub struct Escalation {
    incident_id: IncidentId,
    policy: EscalationPolicy,
    backoff: BackoffPolicy,
    method: NotificationMethod,
    recipients: Vec<PersonId>,
    next_index: usize,
    active: Vec<NotificationAttempt>,
    status: EscalationStatus,
    epoch: u64,
    reports: Vec<ExpiredEscalation>,
}

impl Escalation {
    #[must_use]
    pub fn new(
        incident_id: IncidentId,
        recipients: Vec<PersonId>,
        policy: EscalationPolicy,
        backoff: BackoffPolicy,
        method: NotificationMethod,
    ) -> Self {
        Self {
            incident_id,
            policy,
            backoff,
            method,
            recipients,
            next_index: 0,
            active: Vec::new(),
            status: EscalationStatus::Idle,
            epoch: 0,
            reports: Vec::new(),
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn status(&self) -> &EscalationStatus {
        &self.status
    }

    /// Attempts currently awaiting delivery or acknowledgement.
    #[must_use]
    pub fn active(&self) -> &[NotificationAttempt] {
        &self.active
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(
            self.status,
            EscalationStatus::Idle | EscalationStatus::Notifying { .. }
        )
    }

    /// Drain expiry reports accumulated since the last call.
    pub fn take_reports(&mut self) -> Vec<ExpiredEscalation> {
        std::mem::take(&mut self.reports)
    }

    pub fn start(&mut self, now: Timestamp) -> EscalationStep {
        if self.status != EscalationStatus::Idle {
            return EscalationStep::Idle;
        }
        self.epoch += 1;
        match self.policy {
            EscalationPolicy::Sequential => self.advance(now),
            EscalationPolicy::Parallel => {
                self.next_index = self.recipients.len();
                let attempts: Vec<NotificationAttempt> = self
                    .recipients
                    .iter()
                    .map(|recipient| self.first_attempt(*recipient, now))
                    .collect();
                let Some(first) = attempts.first() else {
                    return self.exhaust(now);
                };
                self.status = EscalationStatus::Notifying {
                    recipient: first.recipient,
                };
                self.active.clone_from(&attempts);
                EscalationStep::Dispatch(attempts)
            }
        }
    }

    /// The notifier accepted the dispatch to `recipient`.
    pub fn dispatched(&mut self, recipient: PersonId, now: Timestamp) -> EscalationStep {
        let Some(index) = self.attempt(recipient) else {
            return EscalationStep::Idle;
        };
        self.epoch += 1;
        EscalationStep::AwaitAcknowledgement(time::until(now, self.active[index].expiration_time))
    }

    /// The dispatch to `recipient` failed, immediately or asynchronously.
    pub fn dispatch_failed(&mut self, recipient: PersonId, now: Timestamp) -> EscalationStep {
        let Some(index) = self.attempt(recipient) else {
            return EscalationStep::Idle;
        };
        self.epoch += 1;
        match self.policy {
            EscalationPolicy::Sequential => {
                match self.active[index].expiry(now, self.backoff.max_retries) {
                    Some(reason) => {
                        self.expire(index, reason);
                        self.advance(now)
                    }
                    None => EscalationStep::RetryAfter(self.active[index].retry_delay(&self.backoff)),
                }
            }
            EscalationPolicy::Parallel => {
                self.expire(index, ExpiryReason::RetriesExhausted);
                match self.next_deadline() {
                    Some(deadline) => EscalationStep::AwaitAcknowledgement(time::until(now, deadline)),
                    None => self.exhaust(now),
                }
            }
        }
    }

    /// A scheduled retry fired. Expiry is checked before re-dispatching.
    pub fn retry_due(&mut self, now: Timestamp) -> EscalationStep {
        if self.policy != EscalationPolicy::Sequential || self.active.is_empty() {
            return EscalationStep::Idle;
        }
        self.epoch += 1;
        if let Some(reason) = self.active[0].expiry(now, self.backoff.max_retries) {
            self.expire(0, reason);
            return self.advance(now);
        }
        let attempt = &mut self.active[0];
        attempt.record_dispatch(now);
        EscalationStep::Dispatch(vec![attempt.clone()])
    }

    /// The acknowledgement deadline of the active attempts passed.
    pub fn acknowledgement_deadline(&mut self, now: Timestamp) -> EscalationStep {
        if self.is_finished() {
            return EscalationStep::Idle;
        }
        self.epoch += 1;
        while let Some(index) = self
            .active
            .iter()
            .position(|attempt| now >= attempt.expiration_time)
        {
            self.expire(index, ExpiryReason::TimedOut);
        }
        if let Some(deadline) = self.next_deadline() {
            return EscalationStep::AwaitAcknowledgement(time::until(now, deadline));
        }
        match self.policy {
            EscalationPolicy::Sequential => self.advance(now),
            EscalationPolicy::Parallel => self.exhaust(now),
        }
    }

    /// Returns `false` when `person` is not a recipient or escalation is over.
    pub fn acknowledge(&mut self, person: PersonId, now: Timestamp) -> bool {
        if self.is_finished() || !self.recipients.contains(&person) {
            return false;
        }
        self.epoch += 1;
        self.active.clear();
        self.status = EscalationStatus::Acknowledged { by: person, at: now };
        true
    }

    /// Abandon the walk (incident closed).
    pub fn stop(&mut self) {
        self.epoch += 1;
        self.active.clear();
        if !self.is_finished() {
            self.status = EscalationStatus::Stopped;
        }
    }

    fn next_deadline(&self) -> Option<Timestamp> {
        self.active.iter().map(|attempt| attempt.expiration_time).min()
    }

    fn attempt(&self, recipient: PersonId) -> Option<usize> {
        self.active
            .iter()
            .position(|attempt| attempt.recipient == recipient)
    }

    fn first_attempt(&self, recipient: PersonId, now: Timestamp) -> NotificationAttempt {
        let mut attempt = NotificationAttempt::new(
            self.incident_id,
            recipient,
            self.method,
            now,
            self.backoff.attempt_ttl,
        );
        attempt.record_dispatch(now);
        attempt
    }

    fn advance(&mut self, now: Timestamp) -> EscalationStep {
        let Some(recipient) = self.recipients.get(self.next_index).copied() else {
            return self.exhaust(now);
        };
        self.next_index += 1;
        let attempt = self.first_attempt(recipient, now);
        self.active = vec![attempt.clone()];
        self.status = EscalationStatus::Notifying { recipient };
        EscalationStep::Dispatch(vec![attempt])
    }

    fn expire(&mut self, index: usize, reason: ExpiryReason) {
        let attempt = self.active.remove(index);
        self.reports.push(ExpiredEscalation {
            incident_id: self.incident_id,
            recipient: Some(attempt.recipient),
            attempts: attempt.attempt_count,
            reason,
        });
    }

    fn exhaust(&mut self, now: Timestamp) -> EscalationStep {
        self.active.clear();
        self.status = EscalationStatus::Exhausted { at: now };
        self.reports.push(ExpiredEscalation {
            incident_id: self.incident_id,
            recipient: None,
            attempts: 0,
            reason: ExpiryReason::CallTreeExhausted,
        });
        EscalationStep::Exhausted
    }
}
