//! Scheduler behavior under virtual time.
//!
//! The fleet job and the schedule repository are in-memory fakes so the
//! runtime clock can be paused and advanced deterministically.

use async_trait::async_trait;
use bridge_traits::{Clock, ManualClock};
use chrono::{TimeZone, Utc};
use core_library::{ScheduleRecord, ScheduleRepository, SYNC_JOB_TYPE};
use core_runtime::events::{CoreEvent, EventBus, EventStream, SchedulerEvent};
use core_sync::{
    FleetJob, FleetReport, FleetRunId, SchedulerActor, SchedulerConfig, SchedulerError,
    SchedulerHandle, SchedulerState, TickOutcome, WorkerMessage, WorkerSignal,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

const MINUTE: Duration = Duration::from_secs(60);

// ============================================================================
// Fakes
// ============================================================================

/// Counts passes. A gated job blocks until [`CountingJob::release`].
struct CountingJob {
    started: AtomicUsize,
    gate: Option<Semaphore>,
}

impl CountingJob {
    fn instant() -> Arc<Self> {
        Arc::new(Self {
            started: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn gated() -> Arc<Self> {
        Arc::new(Self {
            started: AtomicUsize::new(0),
            gate: Some(Semaphore::new(0)),
        })
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl FleetJob for CountingJob {
    async fn run_pass(&self, run_id: FleetRunId) -> core_sync::Result<FleetReport> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(FleetReport::empty(run_id))
    }
}

/// Panics on its first pass, succeeds afterwards.
#[derive(Default)]
struct PanickingJob {
    calls: AtomicUsize,
}

#[async_trait]
impl FleetJob for PanickingJob {
    async fn run_pass(&self, run_id: FleetRunId) -> core_sync::Result<FleetReport> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("provider blew up");
        }
        Ok(FleetReport::empty(run_id))
    }
}

#[derive(Default)]
struct MemoryScheduleRepository {
    records: Mutex<HashMap<String, ScheduleRecord>>,
}

impl MemoryScheduleRepository {
    fn with_record(record: ScheduleRecord) -> Arc<Self> {
        let repo = Self::default();
        repo.records
            .lock()
            .unwrap()
            .insert(record.job_type.clone(), record);
        Arc::new(repo)
    }

    fn last_run_at(&self) -> Option<i64> {
        self.records
            .lock()
            .unwrap()
            .get(SYNC_JOB_TYPE)
            .and_then(|r| r.last_run_at)
    }
}

#[async_trait]
impl ScheduleRepository for MemoryScheduleRepository {
    async fn ensure(
        &self,
        job_type: &str,
        period: Duration,
        now: i64,
    ) -> core_library::Result<(ScheduleRecord, bool)> {
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.get(job_type) {
            return Ok((existing.clone(), false));
        }
        let record = ScheduleRecord {
            job_type: job_type.to_string(),
            period,
            created_at: now,
            last_run_at: None,
        };
        records.insert(job_type.to_string(), record.clone());
        Ok((record, true))
    }

    async fn find(&self, job_type: &str) -> core_library::Result<Option<ScheduleRecord>> {
        Ok(self.records.lock().unwrap().get(job_type).cloned())
    }

    async fn record_run(&self, job_type: &str, at: i64) -> core_library::Result<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(job_type) {
            record.last_run_at = Some(at);
        }
        Ok(())
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ))
}

fn config(period: Duration) -> SchedulerConfig {
    SchedulerConfig {
        job_type: SYNC_JOB_TYPE.to_string(),
        period,
    }
}

async fn start(
    job: Arc<CountingJob>,
    schedule: Arc<MemoryScheduleRepository>,
    clock: Arc<ManualClock>,
    bus: EventBus,
) -> SchedulerHandle {
    SchedulerActor::spawn(config(MINUTE), job, schedule, clock, bus)
        .await
        .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_pass_runs_one_period_after_creation() {
    let job = CountingJob::instant();
    let schedule = Arc::new(MemoryScheduleRepository::default());
    let clock = clock();
    let handle = start(job.clone(), schedule.clone(), clock.clone(), EventBus::new(16)).await;

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(job.started(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(job.started(), 1);

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, SchedulerState::Scheduled);
    assert_eq!(status.passes_completed, 1);
    assert_eq!(status.period, MINUTE);
    assert_eq!(schedule.last_run_at(), Some(clock.unix_timestamp_millis()));

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_restart_resumes_persisted_cadence() {
    let clock = clock();
    let now = clock.unix_timestamp_millis();
    // Created long ago with a one-hour period; last pass finished 40 minutes ago.
    let schedule = MemoryScheduleRepository::with_record(ScheduleRecord {
        job_type: SYNC_JOB_TYPE.to_string(),
        period: 60 * MINUTE,
        created_at: now - 10 * 60 * 60 * 1000,
        last_run_at: Some(now - 40 * 60 * 1000),
    });
    let job = CountingJob::instant();
    let handle = start(job.clone(), schedule, clock, EventBus::new(16)).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.period, 60 * MINUTE, "existing record keeps its period");

    tokio::time::sleep(19 * MINUTE).await;
    assert_eq!(job.started(), 0);

    tokio::time::sleep(2 * MINUTE).await;
    assert_eq!(job.started(), 1);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_overdue_schedule_runs_immediately() {
    let clock = clock();
    let now = clock.unix_timestamp_millis();
    let schedule = MemoryScheduleRepository::with_record(ScheduleRecord {
        job_type: SYNC_JOB_TYPE.to_string(),
        period: MINUTE,
        created_at: now - 5 * 60 * 1000,
        last_run_at: None,
    });
    let job = CountingJob::instant();
    let handle = start(job.clone(), schedule, clock, EventBus::new(16)).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(job.started(), 1);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_ticks_during_a_running_pass_are_suppressed() {
    let job = CountingJob::gated();
    let schedule = Arc::new(MemoryScheduleRepository::default());
    let bus = EventBus::new(64);
    let mut events = EventStream::new(bus.subscribe());
    let handle = start(job.clone(), schedule.clone(), clock(), bus).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(job.started(), 1);

    // Ticks at 2, 3 and 4 minutes fall inside the running pass.
    tokio::time::sleep(3 * MINUTE).await;
    let status = handle.status().await.unwrap();
    assert!(matches!(status.state, SchedulerState::Running(_)));
    assert_eq!(status.ticks_suppressed, 3);
    assert_eq!(job.started(), 1);
    assert_eq!(schedule.last_run_at(), None);

    let running = status.state.running_run().unwrap();
    match handle.trigger_now().await.unwrap() {
        TickOutcome::Suppressed { running: id } => assert_eq!(id, running),
        other => panic!("expected suppression, got {:?}", other),
    }

    job.release();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, SchedulerState::Scheduled);
    assert_eq!(status.passes_completed, 1);
    assert!(schedule.last_run_at().is_some());

    let mut suppressed = 0;
    let mut completed = 0;
    while let Some(Ok(event)) = events.try_recv() {
        match event {
            CoreEvent::Scheduler(SchedulerEvent::TickSuppressed { running_run_id }) => {
                assert_eq!(running_run_id, running.to_string());
                suppressed += 1;
            }
            CoreEvent::Scheduler(SchedulerEvent::PassCompleted { run_id, .. }) => {
                assert_eq!(run_id, running.to_string());
                completed += 1;
            }
            _ => {}
        }
    }
    assert_eq!(suppressed, 4);
    assert_eq!(completed, 1);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_pass_returns_scheduler_to_scheduled() {
    let job = Arc::new(PanickingJob::default());
    let schedule = Arc::new(MemoryScheduleRepository::default());
    let bus = EventBus::new(64);
    let mut events = EventStream::new(bus.subscribe());
    let handle = SchedulerActor::spawn(config(MINUTE), job.clone(), schedule.clone(), clock(), bus)
        .await
        .unwrap();

    let first = handle.trigger_now().await.unwrap();
    let TickOutcome::Started(first_run) = first else {
        panic!("expected a new pass, got {:?}", first);
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, SchedulerState::Scheduled);
    assert_eq!(status.passes_completed, 1);
    assert_eq!(status.ticks_suppressed, 0);
    assert!(schedule.last_run_at().is_some());

    let mut completed = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        if let CoreEvent::Scheduler(SchedulerEvent::PassCompleted { run_id, accounts, .. }) = event {
            completed.push((run_id, accounts));
        }
    }
    assert_eq!(completed, vec![(first_run.to_string(), 0)]);

    // Later ticks keep running passes.
    tokio::time::sleep(2 * MINUTE).await;
    assert!(job.calls.load(Ordering::SeqCst) >= 2);
    assert!(matches!(
        handle.trigger_now().await.unwrap(),
        TickOutcome::Started(_)
    ));

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_trigger_now_starts_a_pass_outside_the_period() {
    let job = CountingJob::instant();
    let handle = start(
        job.clone(),
        Arc::new(MemoryScheduleRepository::default()),
        clock(),
        EventBus::new(16),
    )
    .await;

    let outcome = handle.trigger_now().await.unwrap();
    assert!(matches!(outcome, TickOutcome::Started(_)));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(job.started(), 1);
    assert_eq!(handle.status().await.unwrap().passes_completed, 1);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_host_timer_can_deliver_worker_messages() {
    let job = CountingJob::instant();
    let handle = start(
        job.clone(),
        Arc::new(MemoryScheduleRepository::default()),
        clock(),
        EventBus::new(16),
    )
    .await;

    handle.notify(WorkerMessage::Sync).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(job.started(), 1);
    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_ticks_and_rejects_calls() {
    let job = CountingJob::instant();
    let handle = start(
        job.clone(),
        Arc::new(MemoryScheduleRepository::default()),
        clock(),
        EventBus::new(16),
    )
    .await;

    handle.shutdown();
    assert!(handle.is_shut_down());
    tokio::time::sleep(5 * MINUTE).await;

    assert_eq!(job.started(), 0);
    assert!(matches!(
        handle.status().await,
        Err(SchedulerError::ServiceUnavailable)
    ));
}

#[tokio::test]
async fn test_zero_period_is_rejected() {
    let result = SchedulerActor::spawn(
        config(Duration::ZERO),
        CountingJob::instant(),
        Arc::new(MemoryScheduleRepository::default()),
        clock(),
        EventBus::new(16),
    )
    .await;

    assert!(matches!(result, Err(SchedulerError::InvalidPeriod(_))));
}

#[test]
fn test_worker_protocol_wire_format() {
    assert_eq!(
        serde_json::to_value(WorkerMessage::Sync).unwrap(),
        serde_json::json!({ "type": "SYNC" })
    );
    assert_eq!(
        serde_json::to_value(WorkerSignal::Start).unwrap(),
        serde_json::json!({ "type": "START" })
    );
    let parsed: WorkerMessage = serde_json::from_str(r#"{"type":"SYNC"}"#).unwrap();
    assert_eq!(parsed, WorkerMessage::Sync);
}
