//! # vigil-app
//!
//! Application layer: the incident coordinator, its services and the
//! **port definitions** (traits) adapters implement.
//!
//! ## Responsibilities
//! - Define **port traits** for everything that does IO:
//!   - `IncidentRepository`: open and archived incidents per place
//!   - `CallTreeRepository`: ordered call trees per (place, namespace)
//!   - `PersonDirectory`: people that can be notified
//!   - `Notifier`: hands a notification to a delivery channel
//!   - `Scheduler` / `Clock`: deferred tasks and the current time
//! - Provide the **driving side**:
//!   - `AlarmCoordinator`: device changes and commands in, incident
//!     transitions and escalation out
//!   - `CallTreeService`: call tree maintenance and recipient resolution
//! - Provide `TokioScheduler`, the in-process scheduler used at runtime
//!
//! ## Dependency rule
//! Depends on `vigil-domain` only (plus `tokio` for locks, channels and
//! timers). Never imports adapter crates.

pub mod coordinator;
pub mod ports;
pub mod scheduler;
pub mod services;

#[cfg(test)]
mod testing;
