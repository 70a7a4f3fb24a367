//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`VigilError`]
//! via `#[from]`. Escalation expiry is not an error: it is reported as an
//! [`ExpiredEscalation`](crate::escalation::ExpiredEscalation) value.

use crate::alarm::AlarmType;

/// Top-level error shared by ports and services.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("invalid trigger predicate")]
    Parse(#[from] ParseError),

    #[error("invalid alarm configuration")]
    Configuration(#[from] ConfigurationError),

    #[error("storage error")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("model address must not be empty")]
    EmptyAddress,

    #[error("call tree position {0} is used more than once")]
    DuplicatePosition(u32),

    #[error("person {0} appears more than once in the call tree")]
    DuplicatePerson(String),

    #[error("unknown alarm type {0:?}")]
    UnknownAlarmType(String),

    #[error("invalid identifier {0:?}")]
    InvalidId(String),

    #[error("invalid person reference {0:?}")]
    InvalidPersonReference(String),

    #[error("person {0} is not being notified for this incident")]
    NotARecipient(String),
}

/// A lookup that found nothing.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A predicate text that does not compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    /// Byte offset into the source text.
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Startup-time registry misconfiguration. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("alarm type {0} has no trigger classifier")]
    MissingClassifier(AlarmType),

    #[error("alarm type {0} has no trigger definition")]
    MissingDefinition(AlarmType),

    #[error("predicate for {alarm_type} does not compile")]
    InvalidPredicate {
        alarm_type: AlarmType,
        #[source]
        source: ParseError,
    },
}

/// A notification that could not be handed to the delivery channel.
///
/// Recovered by the retry/backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification dispatch failed: {reason}")]
pub struct TransientDispatchError {
    pub reason: String,
}

impl TransientDispatchError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
