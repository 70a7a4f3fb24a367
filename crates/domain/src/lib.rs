//! # vigil-domain
//!
//! Pure domain model for the vigil alarm core.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Models** and **Snapshots** (device capability attributes per place)
//! - Compile and evaluate **Trigger predicates**
//! - Define **Alarm types**, their definitions and trigger classifiers
//! - Drive the **Alert state machine** (INACTIVE → PREALERT → ALERT → …)
//! - Hold **Incidents**, **Call trees** and the **Escalation** walk with retry/backoff
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod alarm;
pub mod call_tree;
pub mod escalation;
pub mod event;
pub mod incident;
pub mod model;
pub mod predicate;
pub mod state_machine;
