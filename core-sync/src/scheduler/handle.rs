use super::messages::{SchedulerError, SchedulerMessage, SchedulerStatus, TickOutcome, WorkerMessage};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Public interface of the scheduler actor.
///
/// Cheap to clone. Every call fails with [`SchedulerError::ServiceUnavailable`]
/// once the actor has stopped.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerMessage>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    pub(super) fn new(sender: mpsc::Sender<SchedulerMessage>, cancel: CancellationToken) -> Self {
        Self { sender, cancel }
    }

    /// Run a fleet pass now, outside the period.
    ///
    /// Returns [`TickOutcome::Suppressed`] when a pass is already running.
    pub async fn trigger_now(&self) -> Result<TickOutcome, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(SchedulerMessage::TriggerNow { reply })
            .await
            .map_err(|_| SchedulerError::ServiceUnavailable)?;
        rx.await.map_err(|_| SchedulerError::ServiceUnavailable)
    }

    pub async fn status(&self) -> Result<SchedulerStatus, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(SchedulerMessage::Status { reply })
            .await
            .map_err(|_| SchedulerError::ServiceUnavailable)?;
        rx.await.map_err(|_| SchedulerError::ServiceUnavailable)
    }

    /// Deliver a worker message from a host-driven timer.
    pub async fn notify(&self, message: WorkerMessage) -> Result<(), SchedulerError> {
        self.sender
            .send(SchedulerMessage::Worker(message))
            .await
            .map_err(|_| SchedulerError::ServiceUnavailable)
    }

    /// Stop the timer and the actor. A running pass is left to finish.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
