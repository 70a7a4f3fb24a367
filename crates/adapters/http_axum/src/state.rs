//! Shared application state for axum handlers.

use vigil_app::coordinator::AlarmCoordinator;
use vigil_app::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler,
};

/// Application state shared across all axum handlers.
///
/// Generic over the coordinator's ports to avoid dynamic dispatch. The
/// coordinator is a handle, so cloning the state is cheap.
pub struct AppState<I, C, P, N, S, K> {
    pub coordinator: AlarmCoordinator<I, C, P, N, S, K>,
}

impl<I, C, P, N, S, K> Clone for AppState<I, C, P, N, S, K> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<I, C, P, N, S, K> AppState<I, C, P, N, S, K>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    pub fn new(coordinator: AlarmCoordinator<I, C, P, N, S, K>) -> Self {
        Self { coordinator }
    }
}
