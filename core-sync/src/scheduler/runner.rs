use super::handle::SchedulerHandle;
use super::messages::{
    SchedulerError, SchedulerMessage, SchedulerStatus, TickOutcome, WorkerMessage, WorkerSignal,
};
use super::state::SchedulerState;
use super::worker::ScheduleWorker;
use crate::fleet::{FleetJob, FleetReport, FleetRunId};
use bridge_traits::Clock;
use core_library::{ScheduleRecord, ScheduleRepository};
use core_runtime::events::{CoreEvent, EventBus, SchedulerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CHANNEL_CAPACITY: usize = 32;

/// What to schedule.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub job_type: String,
    /// Period used when the record is created. An existing record keeps its own.
    pub period: Duration,
}

/// Scheduler actor
///
/// Owns the [`SchedulerState`] and advances it only from its message loop.
/// Passes run on spawned tasks and report back with
/// [`SchedulerMessage::PassFinished`], so status queries and suppressed
/// ticks are answered while a pass is in flight.
pub struct SchedulerActor {
    state: SchedulerState,
    record: ScheduleRecord,
    job: Arc<dyn FleetJob>,
    schedule: Arc<dyn ScheduleRepository>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    receiver: mpsc::Receiver<SchedulerMessage>,
    sender: mpsc::Sender<SchedulerMessage>,
    cancel: CancellationToken,
    passes_completed: u64,
    ticks_suppressed: u64,
    last_report: Option<FleetReport>,
}

impl SchedulerActor {
    /// Create or load the schedule record, start the worker and the actor.
    ///
    /// The record is created only when absent. The first tick is due one
    /// period after the last finished pass (or after creation if none ran),
    /// so restarts neither skip nor repeat a pass.
    pub async fn spawn(
        config: SchedulerConfig,
        job: Arc<dyn FleetJob>,
        schedule: Arc<dyn ScheduleRepository>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Result<SchedulerHandle, SchedulerError> {
        if config.period.is_zero() {
            return Err(SchedulerError::InvalidPeriod(config.period));
        }

        let now = clock.unix_timestamp_millis();
        let (record, created) = schedule
            .ensure(&config.job_type, config.period, now)
            .await
            .map_err(|e| SchedulerError::Storage(e.to_string()))?;

        if record.period.is_zero() {
            return Err(SchedulerError::InvalidPeriod(record.period));
        }

        let mut state = SchedulerState::default();
        state.initialize()?;

        let due_in_ms = record.next_due_at().saturating_sub(now).max(0);
        let first_tick_in = Duration::from_millis(due_in_ms as u64);
        info!(
            job_type = %record.job_type,
            created,
            period_secs = record.period.as_secs(),
            first_tick_in_secs = first_tick_in.as_secs(),
            "Scheduler initialized"
        );

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let worker = ScheduleWorker::new(
            record.period,
            first_tick_in,
            signal_rx,
            sender.clone(),
            cancel.child_token(),
        );
        tokio::spawn(worker.run());

        let actor = SchedulerActor {
            state,
            record,
            job,
            schedule,
            clock,
            event_bus,
            receiver,
            sender: sender.clone(),
            cancel: cancel.clone(),
            passes_completed: 0,
            ticks_suppressed: 0,
            last_report: None,
        };
        tokio::spawn(actor.run(signal_tx));

        Ok(SchedulerHandle::new(sender, cancel))
    }

    async fn run(mut self, worker_signals: mpsc::Sender<WorkerSignal>) {
        if worker_signals.send(WorkerSignal::Start).await.is_err() {
            error!("Schedule worker exited before start");
        }
        info!("Scheduler actor started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
            }
        }

        let _ = worker_signals.send(WorkerSignal::Shutdown).await;
        if let Some(run_id) = self.state.running_run() {
            // In-flight passes are not cancelled; they finish on their own task.
            info!(run_id = %run_id, "Scheduler stopped with a pass still running");
        }
        info!("Scheduler actor stopped");
    }

    async fn handle_message(&mut self, message: SchedulerMessage) {
        match message {
            SchedulerMessage::Worker(WorkerMessage::Sync) => {
                self.tick();
            }

            SchedulerMessage::TriggerNow { reply } => {
                let outcome = self.tick();
                let _ = reply.send(outcome);
            }

            SchedulerMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }

            SchedulerMessage::PassFinished { run_id, result } => {
                self.finish_pass(run_id, result).await;
            }
        }
    }

    /// Start a pass unless one is running.
    fn tick(&mut self) -> TickOutcome {
        let run_id = match self.state.start_pass() {
            TickOutcome::Started(run_id) => run_id,
            TickOutcome::Suppressed { running } => {
                self.ticks_suppressed += 1;
                warn!(running_run_id = %running, "Previous fleet sync still running, tick suppressed");
                self.emit(SchedulerEvent::TickSuppressed {
                    running_run_id: running.to_string(),
                });
                return TickOutcome::Suppressed { running };
            }
            TickOutcome::Skipped => {
                error!(state = self.state.as_str(), "Cannot start fleet sync");
                return TickOutcome::Skipped;
            }
        };

        self.emit(SchedulerEvent::PassStarted {
            run_id: run_id.to_string(),
        });

        // A panicking pass still reports back as a failed one.
        let job = Arc::clone(&self.job);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let pass = tokio::spawn(async move { job.run_pass(run_id).await });
            let result = match pass.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_err) => Err(format!("fleet pass aborted: {}", join_err)),
            };
            let _ = sender
                .send(SchedulerMessage::PassFinished { run_id, result })
                .await;
        });

        TickOutcome::Started(run_id)
    }

    async fn finish_pass(&mut self, run_id: FleetRunId, result: Result<FleetReport, String>) {
        if let Err(e) = self.state.finish_run(run_id) {
            warn!(run_id = %run_id, error = %e, "Ignoring completion of unknown pass");
            return;
        }

        let finished_at = self.clock.unix_timestamp_millis();
        if let Err(e) = self.schedule.record_run(&self.record.job_type, finished_at).await {
            error!(error = %e, "Failed to persist last run time");
        }
        self.record.last_run_at = Some(finished_at);
        self.passes_completed += 1;

        match result {
            Ok(report) => {
                self.emit(SchedulerEvent::PassCompleted {
                    run_id: run_id.to_string(),
                    accounts: report.accounts as u64,
                    succeeded: report.succeeded as u64,
                    failed: report.failed as u64,
                    duration_ms: report.duration.as_millis() as u64,
                });
                self.last_report = Some(report);
            }
            Err(message) => {
                error!(run_id = %run_id, error = %message, "Fleet sync could not run");
                self.emit(SchedulerEvent::PassCompleted {
                    run_id: run_id.to_string(),
                    accounts: 0,
                    succeeded: 0,
                    failed: 0,
                    duration_ms: 0,
                });
            }
        }
    }

    fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state,
            job_type: self.record.job_type.clone(),
            period: self.record.period,
            last_run_at: self.record.last_run_at,
            passes_completed: self.passes_completed,
            ticks_suppressed: self.ticks_suppressed,
            last_report: self.last_report.clone(),
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        let _ = self.event_bus.emit(CoreEvent::Scheduler(event));
    }
}
