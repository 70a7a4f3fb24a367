//! Application services.
//!
//! Services take their ports as generic parameters.

pub mod call_tree_service;
