//! # vigil-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Accept **device changes** and **alarm commands** (confirm, cancel,
//!   acknowledge, delivery outcomes) and hand them to the coordinator
//! - Serve incidents and call trees as JSON
//! - Map domain errors to HTTP status codes
//!
//! ## Dependency rule
//! Depends on `vigil-app` (for the coordinator and port traits) and
//! `vigil-domain` (for request/response types). Never leaks axum types into
//! the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod test_support;
