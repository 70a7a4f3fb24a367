//! Port definitions: the traits adapters implement.
//!
//! The coordinator and services only talk to storage, people, delivery
//! channels and time through these.

pub mod call_tree_repo;
pub mod clock;
pub mod incident_repo;
pub mod notifier;
pub mod person_directory;
pub mod scheduler;

pub use call_tree_repo::CallTreeRepository;
pub use clock::{Clock, SystemClock};
pub use incident_repo::IncidentRepository;
pub use notifier::Notifier;
pub use person_directory::PersonDirectory;
pub use scheduler::{Scheduler, Task, TaskHandle};
