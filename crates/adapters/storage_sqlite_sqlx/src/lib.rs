//! # vigil-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement `IncidentRepository`, `CallTreeRepository` and
//!   `PersonDirectory` from `vigil-app::ports`
//! - Manage the `SQLite` connection pool and run the embedded migrations
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `vigil-app` (for port traits) and `vigil-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod call_tree_repo;
pub mod error;
pub mod incident_repo;
pub mod person_repo;
pub mod pool;

pub use call_tree_repo::SqliteCallTreeRepository;
pub use incident_repo::SqliteIncidentRepository;
pub use person_repo::SqlitePersonDirectory;
pub use pool::{Config, Database};
