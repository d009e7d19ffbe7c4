//! Tokio-backed scheduler

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{ScheduledTask, Scheduler};

pub type ScheduledTaskReceiver = mpsc::UnboundedReceiver<ScheduledTask>;

/// Delivers scheduled tasks back to the service loop after a delay.
///
/// Each `after` spawns a sleeping task on the runtime captured at
/// construction; when it wakes it sends the task over a channel that the
/// service loop selects on, so handlers always run on the loop.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    tx: mpsc::UnboundedSender<ScheduledTask>,
}

impl TokioScheduler {
    /// Must be called from within a tokio runtime
    pub fn new() -> (Self, ScheduledTaskReceiver) {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(handle: Handle) -> (Self, ScheduledTaskReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { handle, tx }, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: ScheduledTask) {
        debug!(
            placement = %task.placement,
            generation = task.generation,
            action = ?task.action,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );

        let tx = self.tx.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(task).is_err() {
                trace!("Scheduler receiver dropped, discarding task");
            }
        });
    }
}
