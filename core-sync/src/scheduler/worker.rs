//! Timer worker.
//!
//! Runs on its own task, separate from the actor and from request handling.
//! It waits for [`WorkerSignal::Start`], then posts [`WorkerMessage::Sync`]
//! to the parent every period. It never runs a pass itself, so a slow pass
//! cannot delay the timer and the parent decides whether a tick is honored.

use super::messages::{SchedulerMessage, WorkerMessage, WorkerSignal};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ScheduleWorker {
    period: Duration,
    first_tick_in: Duration,
    signals: mpsc::Receiver<WorkerSignal>,
    parent: mpsc::Sender<SchedulerMessage>,
    cancel: CancellationToken,
}

impl ScheduleWorker {
    /// `first_tick_in` delays the first tick so a restart does not fire a
    /// pass before the persisted schedule says one is due.
    pub fn new(
        period: Duration,
        first_tick_in: Duration,
        signals: mpsc::Receiver<WorkerSignal>,
        parent: mpsc::Sender<SchedulerMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            period,
            first_tick_in,
            signals,
            parent,
            cancel,
        }
    }

    pub async fn run(mut self) {
        if !self.wait_for_start().await {
            debug!("Schedule worker stopped before start");
            return;
        }

        info!(
            period_secs = self.period.as_secs(),
            first_tick_in_secs = self.first_tick_in.as_secs(),
            "Schedule worker armed"
        );

        let mut ticker = interval_at(Instant::now() + self.first_tick_in, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                signal = self.signals.recv() => {
                    match signal {
                        Some(WorkerSignal::Start) => continue,
                        Some(WorkerSignal::Shutdown) | None => break,
                    }
                }
                _ = ticker.tick() => {
                    debug!("Schedule period elapsed");
                    if self.parent.send(SchedulerMessage::Worker(WorkerMessage::Sync)).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Schedule worker stopped");
    }

    async fn wait_for_start(&mut self) -> bool {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                signal = self.signals.recv() => match signal {
                    Some(WorkerSignal::Start) => return true,
                    Some(WorkerSignal::Shutdown) | None => return false,
                },
            }
        }
    }
}
