//! # Event Bus System
//!
//! Typed broadcast of core activity using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The synchronizer, the account binder and the scheduler publish
//! [`CoreEvent`]s; the host subscribes to render progress, feed metrics or
//! write audit logs. Publishing never blocks and never fails the operation
//! that emitted the event: with no subscribers the event is simply dropped.
//!
//! ```text
//! ┌──────────────┐   emit   ┌──────────┐   subscribe   ┌────────────┐
//! │ AccountBinder├─────────>│          ├──────────────>│ Host UI    │
//! ├──────────────┤          │ EventBus │               └────────────┘
//! │ Synchronizer ├─────────>│          │   subscribe   ┌────────────┐
//! ├──────────────┤          │          ├──────────────>│ Audit log  │
//! │ Scheduler    ├─────────>│          │               └────────────┘
//! └──────────────┘          └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Started {
//!     local_id: "1234".to_string(),
//!     kind: "anime".to_string(),
//! }))
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "List sync started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Account(AccountEvent),
    Sync(SyncEvent),
    Scheduler(SchedulerEvent),
}

impl CoreEvent {
    /// Human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Account(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Scheduler(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Scheduler(SchedulerEvent::PassCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Scheduler(SchedulerEvent::TickSuppressed { .. }) => EventSeverity::Warning,
            CoreEvent::Account(_) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Scheduler(SchedulerEvent::PassCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Account Events
// ============================================================================

/// Binding lifecycle of a local account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AccountEvent {
    /// First binding of a local account to an external identity.
    Bound { local_id: String, external_id: i64 },
    /// An existing binding was replaced with a new token.
    Rebound { local_id: String, external_id: i64 },
    /// Binding and all derived data removed.
    Unbound { local_id: String },
}

impl AccountEvent {
    fn description(&self) -> &str {
        match self {
            AccountEvent::Bound { .. } => "Account bound",
            AccountEvent::Rebound { .. } => "Account binding replaced",
            AccountEvent::Unbound { .. } => "Account unbound",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Per-account list synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        local_id: String,
        kind: String,
    },
    Completed {
        local_id: String,
        kind: String,
        /// Entries written to the snapshot
        entries: u64,
        /// Null or duplicate entries skipped
        skipped: u64,
    },
    /// The account has no lists of this kind; nothing was written.
    NoLists {
        local_id: String,
        kind: String,
    },
    Failed {
        local_id: String,
        kind: String,
        message: String,
        /// Whether re-binding is required before retrying
        requires_rebind: bool,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "List sync started",
            SyncEvent::Completed { .. } => "List sync completed",
            SyncEvent::NoLists { .. } => "No lists to sync",
            SyncEvent::Failed { .. } => "List sync failed",
        }
    }
}

// ============================================================================
// Scheduler Events
// ============================================================================

/// Fleet-wide scheduled passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SchedulerEvent {
    PassStarted {
        run_id: String,
    },
    PassCompleted {
        run_id: String,
        accounts: u64,
        succeeded: u64,
        failed: u64,
        duration_ms: u64,
    },
    /// A tick arrived while the previous pass was still running.
    TickSuppressed {
        running_run_id: String,
    },
}

impl SchedulerEvent {
    fn description(&self) -> &str {
        match self {
            SchedulerEvent::PassStarted { .. } => "Fleet sync started",
            SchedulerEvent::PassCompleted { .. } => "Fleet sync completed",
            SchedulerEvent::TickSuppressed { .. } => "Fleet sync tick suppressed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus buffering at most `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Receives the next matching event without waiting.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(local_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Completed {
            local_id: local_id.to_string(),
            kind: "anime".to_string(),
            entries: 2,
            skipped: 0,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(completed("1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Account(AccountEvent::Bound {
            local_id: "1".to_string(),
            external_id: 77,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Scheduler(_)));

        bus.emit(completed("1")).ok();
        let pass = CoreEvent::Scheduler(SchedulerEvent::PassStarted {
            run_id: "run-1".to_string(),
        });
        bus.emit(pass.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), pass);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(completed(&i.to_string())).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            local_id: "1".to_string(),
            kind: "manga".to_string(),
            message: "upstream 502".to_string(),
            requires_rebind: false,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let degraded = CoreEvent::Scheduler(SchedulerEvent::PassCompleted {
            run_id: "run".to_string(),
            accounts: 3,
            succeeded: 2,
            failed: 1,
            duration_ms: 10,
        });
        assert_eq!(degraded.severity(), EventSeverity::Warning);

        assert_eq!(completed("1").severity(), EventSeverity::Info);

        let started = CoreEvent::Sync(SyncEvent::Started {
            local_id: "1".to_string(),
            kind: "anime".to_string(),
        });
        assert_eq!(started.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Scheduler(SchedulerEvent::TickSuppressed {
            running_run_id: "run-9".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Scheduler");
        assert_eq!(json["payload"]["event"], "TickSuppressed");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
