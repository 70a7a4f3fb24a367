//! Tokio-backed [`Scheduler`].

use std::time::Duration;

use crate::ports::{Scheduler, Task, TaskHandle};

/// Runs each task on the tokio runtime after its delay.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let claim = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if claim.start() {
                task.await;
            }
        });
        handle
    }
}
